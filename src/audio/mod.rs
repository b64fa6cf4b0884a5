// Audio module - format detection, tag reading/writing and chapter frames

pub mod chapters;
pub mod detection;
pub mod metadata;
pub mod metadata_writer;

pub use chapters::{build_chapters, read_chapters, reconcile_with_measured, write_chapters};
pub use detection::{is_audio_file, AudioFormat};
pub use metadata::{measure_duration, read_cover_art, read_track_tags, TrackTags};
pub use metadata_writer::{write_album_metadata, WriteAlbumMetadata};
