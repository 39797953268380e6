//! Frame codec for the Xcom/SCOM protocol
//!
//! A frame is laid out as follows (all integers little-endian):
//!
//! ```text
//! 0xAA | frame_flags u8 | src u32 | dst u32 | data_length u16 | header checksum [2]
//!      | service flags u8 | service id u8 | object type u16 | object id u32
//!      | property id u16 | property data ... | data checksum [2]
//! ```
//!
//! [`Package`] encodes and decodes single frames, [`PackageReader`] pulls
//! packages off a byte-stream transport and resynchronizes after garbage or
//! corrupted input. The [`data`] module holds the structured property data
//! of multi-info, message and GUID services.

pub mod checksum;
pub mod data;
pub mod header;
pub mod package;
pub mod reader;
pub mod service;

pub use checksum::ScomChecksum;
pub use data::{
    Guid, MessageResponse, MultiInfoRequest, MultiInfoRequestItem, MultiInfoResponse,
    MULTI_INFO_MAX_ITEMS,
};
pub use header::{FrameHeader, ResponseFlags, HEADER_SIZE, MAX_DATA_LENGTH, START_BYTE};
pub use package::Package;
pub use reader::{PackageDecoder, PackageReader, ReaderStatistics, MAX_LOOKAHEAD};
pub use service::{Service, ServiceFlags};
pub use xcom_core::{XcomError, XcomResult};
