pub mod discovery;
pub mod encoding;
pub mod packet;
pub mod preset;
pub mod session;
pub mod transport;
