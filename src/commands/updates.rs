//! `servpilot updates` — list and apply package upgrades.

use anyhow::Result;

use super::{block_on, credential, print_json_or_false};
use crate::config::Config;
use crate::domain::host_service::HostService;
use crate::domain::types::UpdateReport;

pub fn check(config: &Config, password: String) -> Result<()> {
    let Some(credential) = credential(password) else {
        println!("false");
        return Ok(());
    };
    let service = HostService::new(config);

    block_on(async {
        let report = service
            .check_updates(&credential)
            .await?
            .map(|updates| UpdateReport {
                items: updates.len(),
                updates,
            });
        print_json_or_false(report.as_ref())
    })
}

pub fn apply(config: &Config, password: String) -> Result<()> {
    let Some(credential) = credential(password) else {
        println!("false");
        return Ok(());
    };
    let service = HostService::new(config);

    block_on(async {
        let count = service.apply_updates(&credential).await?;
        println!("{}", count);
        Ok(())
    })
}
