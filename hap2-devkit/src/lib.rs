/*!
# HAP2 DevKit - fake server and fixtures for plugin development

Helps write and test HAP2 plugins without a broker or a Hatohol server:
- an in-memory fake Hatohol server that answers the plugin's calls
- builders for the JSON-RPC messages the server sends
- fixtures for monitoring server info and events
*/

pub mod builders;
pub mod fake_server;

pub use builders::{EventBuilder, HapiMessageBuilder, ServerInfoBuilder};
pub use fake_server::FakeHatoholServer;
