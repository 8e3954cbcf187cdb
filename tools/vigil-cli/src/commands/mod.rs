pub mod emit;
pub mod info;
pub mod init_config;
pub mod replay;
pub mod run;
pub mod validate;
