//! `servpilot reboot` / `servpilot shutdown`.

use anyhow::Result;

use super::{block_on, credential};
use crate::config::Config;
use crate::domain::host_service::HostService;

pub fn reboot(config: &Config, password: String) -> Result<()> {
    let Some(credential) = credential(password) else {
        println!("false");
        return Ok(());
    };
    let service = HostService::new(config);

    block_on(async {
        println!("{}", service.reboot(&credential).await?);
        Ok(())
    })
}

pub fn shutdown(config: &Config, password: String) -> Result<()> {
    let Some(credential) = credential(password) else {
        println!("false");
        return Ok(());
    };
    let service = HostService::new(config);

    block_on(async {
        println!("{}", service.shutdown(&credential).await?);
        Ok(())
    })
}
