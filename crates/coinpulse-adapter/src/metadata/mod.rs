/*
[INPUT]:  Contract addresses needing descriptive metadata
[OUTPUT]: Cached token metadata records
[POS]:    Metadata layer - memoizing lookup shared by stream services
[UPDATE]: When metadata sources or caching policy change
*/

pub mod resolver;

pub use resolver::{MetadataResolver, MetadataSource};
