pub mod password;
pub mod policy;
pub mod scheme;
pub mod session_token;
pub mod watcher;

pub mod prelude {
    pub use super::password::*;
    pub use super::policy::*;
    pub use super::scheme::*;
    pub use super::session_token::*;
    pub use super::watcher::*;
}
