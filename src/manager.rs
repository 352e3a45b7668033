pub mod message_sender;
pub mod qr_signing_manager;
