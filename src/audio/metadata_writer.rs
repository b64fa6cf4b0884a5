//! Metadata writing for merged output files
//!
//! Writes the album-level fields confirmed during tag review (artist, album,
//! year, genre, front cover, compilation flag) into the primary tag of the
//! merged file. Chapter frames are written separately by `chapters`.

use std::path::Path;

use lofty::{
    Accessor, ItemKey, Picture, PictureType, Probe, Tag, TagExt, TaggedFile, TaggedFileExt,
};

use crate::error::ChapterWriteError;

/// Album metadata to write to a merged file
#[derive(Debug, Clone, Default)]
pub struct WriteAlbumMetadata {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<String>,
    pub genre: Option<String>,
    /// Raw image bytes (JPEG or PNG)
    pub cover: Option<Vec<u8>>,
    pub compilation: bool,
}

fn tag_error(path: &Path, message: String) -> ChapterWriteError {
    ChapterWriteError::Tags {
        path: path.to_path_buf(),
        message,
    }
}

/// The file's primary tag, created empty if the file has none
pub(crate) fn primary_tag_or_insert(tagged_file: &mut TaggedFile) -> Option<&mut Tag> {
    if tagged_file.primary_tag().is_none() {
        let tag_type = tagged_file.primary_tag_type();
        tagged_file.insert_tag(Tag::new(tag_type));
    }
    tagged_file.primary_tag_mut()
}

/// Write album metadata to an audio file
///
/// Updates the primary tag of the file, creating it if missing.
/// Only fields that are Some will be updated.
pub fn write_album_metadata(
    path: &Path,
    metadata: &WriteAlbumMetadata,
) -> Result<(), ChapterWriteError> {
    let mut tagged_file = Probe::open(path)
        .map_err(|e| tag_error(path, format!("Failed to open file: {}", e)))?
        .read()
        .map_err(|e| tag_error(path, format!("Failed to read file: {}", e)))?;

    let tag = primary_tag_or_insert(&mut tagged_file)
        .ok_or_else(|| tag_error(path, "Failed to create tag".to_string()))?;

    if let Some(artist) = &metadata.artist {
        tag.set_artist(artist.clone());
    }
    if let Some(album) = &metadata.album {
        tag.set_album(album.clone());
    }
    if let Some(year) = &metadata.year {
        match year.trim().parse::<u32>() {
            Ok(y) => tag.set_year(y),
            Err(_) => log::warn!("Ignoring non-numeric year '{}' for {}", year, path.display()),
        }
    }
    if let Some(genre) = &metadata.genre {
        tag.set_genre(genre.clone());
    }
    if let Some(cover) = &metadata.cover {
        let mut picture = Picture::from_reader(&mut cover.as_slice())
            .map_err(|e| tag_error(path, format!("Unsupported cover image: {}", e)))?;
        picture.set_pic_type(PictureType::CoverFront);
        tag.remove_picture_type(PictureType::CoverFront);
        tag.push_picture(picture);
    }

    tag.remove_key(&ItemKey::FlagCompilation);
    if metadata.compilation {
        tag.insert_text(ItemKey::FlagCompilation, "1".to_string());
    }

    tag.save_to_path(path)
        .map_err(|e| tag_error(path, format!("Failed to save file: {}", e)))?;

    Ok(())
}
