//! `servpilot disk` — usage and model of mounted disks.

use std::path::Path;

use anyhow::Result;

use super::{block_on, print_json, print_text_or_false};
use crate::config::Config;
use crate::domain::host_service::HostService;

pub fn usage(config: &Config, path: &Path) -> Result<()> {
    let service = HostService::new(config);
    block_on(async {
        let usage = service.disk_usage(path).await?;
        print_json(&usage)
    })
}

pub fn label(config: &Config, mountpoint: &str) -> Result<()> {
    let service = HostService::new(config);
    block_on(async {
        let label = service.disk_label(mountpoint).await?;
        print_text_or_false(label.as_deref());
        Ok(())
    })
}
