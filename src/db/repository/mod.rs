pub mod alert;
#[cfg(test)]
pub(crate) mod testing;

pub use alert::{
    AlertStore, SnapshotEvent, SnapshotPublisher, SnapshotSink, SqliteAlertStore, Subscription,
};
