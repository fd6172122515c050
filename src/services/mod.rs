pub mod clock;
pub mod freshness;
pub mod identity;
pub mod init;
pub mod lifecycle;
pub mod session;
pub mod sync;
