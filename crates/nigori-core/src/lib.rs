pub mod config;
pub mod error;
pub mod logging;
pub mod time;
pub mod types;

pub use error::{NigoriError, NigoriResult};

/// Generated wire types (from nigori.proto)
pub mod proto {
    pub mod sync_pb {
        include!(concat!(env!("OUT_DIR"), "/sync_pb.rs"));
    }
}
