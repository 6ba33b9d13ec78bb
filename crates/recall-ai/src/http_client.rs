use std::time::Duration;

use reqwest::Client;

use crate::error::Result;

const DISABLE_SYSTEM_PROXY_ENV: &str = "RECALL_DISABLE_SYSTEM_PROXY";

/// Default per-request bound enforced by the transport.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

pub(crate) fn build_http_client(timeout: Duration) -> Result<Client> {
    let mut builder = Client::builder().timeout(timeout);
    if should_disable_system_proxy() {
        builder = builder.no_proxy();
    }
    Ok(builder.build()?)
}

fn should_disable_system_proxy() -> bool {
    if std::env::var_os(DISABLE_SYSTEM_PROXY_ENV).is_some() {
        return true;
    }

    cfg!(test)
}
