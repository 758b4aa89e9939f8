mod connection_id;
pub use connection_id::next_connection_id;
