pub mod init;
pub mod inspect;
pub mod list_graders;
pub mod results;
pub mod take;
