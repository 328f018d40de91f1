pub mod ingest_channel;
pub mod stream_url;

pub use ingest_channel::IngestChannel;
pub use stream_url::StreamUrl;
