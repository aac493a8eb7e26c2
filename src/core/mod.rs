//! 核心层：错误与恢复、会话监管、Agent 装配

pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod session_supervisor;

pub use error::{AgentError, ErrorDescriptor, ErrorKind, RecoveryAction, RunStatus};
pub use orchestrator::{build_agent, create_agent, create_oracle};
pub use recovery::{RecoveryEngine, RunLedger, Terminal};
pub use session_supervisor::{SessionLease, SessionSupervisor};
