pub mod bedrock;
pub mod codec;
pub mod java;
pub mod shared;
