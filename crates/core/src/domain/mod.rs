pub mod agent;
pub mod conversation;
pub mod pending;
pub mod personality;
pub mod tenant;
