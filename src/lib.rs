pub mod algorithms;
pub mod config;
pub mod console;
pub mod error;
pub mod protocol;
pub mod router;

use std::sync::Arc;
use tokio::sync::Mutex;

pub use config::RouterConfig;
pub use error::{Result, RouterError};
pub use router::{Router, RouterState};

/// The single critical section of one router: its port table and link-state database.
pub type SharedRouterState = Arc<Mutex<RouterState>>;
