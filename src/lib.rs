pub use talon_core::*;

#[cfg(feature = "server")]
pub mod server {
    pub use talon_server::*;
}

#[cfg(feature = "client")]
pub mod client {
    pub use talon_client::*;
}

#[cfg(feature = "pki")]
pub mod pki {
    pub use talon_pki::*;
}

#[cfg(feature = "auth")]
pub mod auth {
    pub use talon_auth::*;
}

pub mod prelude {
    pub use talon_core::prelude::*;

    #[cfg(feature = "server")]
    pub use talon_server::prelude::*;

    #[cfg(feature = "client")]
    pub use talon_client::{SyncClient, SyncHandle, SyncOutcome, TlsMaterial};

    #[cfg(feature = "pki")]
    pub use talon_pki::prelude::*;

    #[cfg(feature = "auth")]
    pub use talon_auth::prelude::*;
}
