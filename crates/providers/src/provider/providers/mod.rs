pub mod direct;
pub mod m3u;
pub mod xtream;

pub use direct::DirectProvider;
pub use m3u::M3uProvider;
pub use xtream::XtreamProvider;
