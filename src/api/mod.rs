// External service clients
pub mod firebase;
