//! Built-in management commands.

pub mod check;
pub mod createuser;
pub mod serve;

pub use check::CheckCommand;
pub use createuser::CreateUserCommand;
pub use serve::ServeCommand;
