//! HAP2 plugin that monitors the machine it runs on.
//!
//! Reports one host with CPU and memory items, raises a trigger when either
//! goes above 90% and answers the server's fetch requests.
//!
//! ```text
//! hap2-plugin-localhost --broker localhost --queue hap2-localhost
//! ```

mod monitor;
mod plugin;
mod probe;

use hap2_runtime::standard_hap::launch;
use plugin::LocalhostPlugin;
use probe::SystemProbe;

#[tokio::main]
async fn main() {
    let plugin = LocalhostPlugin::new(Box::new(SystemProbe::new()));
    std::process::exit(launch(plugin).await);
}
