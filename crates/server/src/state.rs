use std::sync::Mutex;

use regula_core::Config;
use regula_parser::InstructionParser;
use regula_store::RuleStore;

/// Shared application state.
///
/// The store runs read-modify-write against its substrate, so a mutex
/// serializes handlers within this process. Independent processes sharing
/// the same data directory are not coordinated — single logical writer.
pub struct AppState {
    pub parser: InstructionParser,
    pub store: Mutex<RuleStore>,
    pub config: Config,
}
