//! Merges remote tracks from any number of remote stream objects into one
//! render-ready composite.

pub mod composite_stream;
pub mod remote_stream;
pub mod remote_track;
pub mod stream_aggregator;

pub use composite_stream::CompositeStream;
pub use remote_stream::RemoteStream;
pub use remote_track::RemoteTrack;
pub use stream_aggregator::RemoteStreamAggregator;
