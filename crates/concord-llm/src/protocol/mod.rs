//! Wire format types for each supported external protocol
//!
//! Pure serde structs matching the respective JSON bodies. They are used
//! only at the boundary; everything else works on the canonical types.

pub mod bedrock;
pub mod claude;
pub mod openai;
pub mod titan;
