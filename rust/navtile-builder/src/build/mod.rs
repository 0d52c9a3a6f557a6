pub mod convert;
pub mod verify;

pub use convert::{convert_file, BuildSummary};
pub use verify::{verify_file, verify_mesh, VerifyOptions, VerifyReport};
