pub mod channel;
pub mod commit;
pub mod package;
