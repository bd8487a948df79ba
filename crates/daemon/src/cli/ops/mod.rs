pub mod daemon;
pub mod health;
pub mod pull;
pub mod push;
pub mod reissue;
pub mod token;
pub mod version;

pub use daemon::Daemon;
pub use health::Health;
pub use pull::Pull;
pub use push::Push;
pub use reissue::Reissue;
pub use token::Token;
pub use version::Version;
