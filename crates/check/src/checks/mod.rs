mod check_result;
pub use check_result::{CheckResult, UnaccountedStats};

mod unreferenced_nodes;
pub use unreferenced_nodes::CheckUnreferencedNodes;

mod utils;
