pub mod source;
pub mod uploader;

pub use source::JsonlSource;
pub use uploader::{CrmConfig, ReqwestUploader};
