pub mod init;
pub mod run;
pub mod sessions;
pub mod tools;
