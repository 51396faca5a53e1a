//! Live photo insertion without a visible jump.
//!
//! A new photo goes right after the one on screen. Inserting into the list
//! changes what `index mod len` points at, so the timeline is shifted by whole
//! cycles to keep the current slide where it is.

use log::{info, warn};

use super::timeline::Timeline;
use crate::entities::Photo;

/// Insert `photo` after the current slide. Returns its position in `photos`,
/// or `None` if a photo with the same id is already present.
///
/// With `n` photos and current index `idx`, every full cycle before `idx`
/// gains one more slide, so time moves forward by `idx div n` slides.
pub fn insert_live_photo(photos: &mut Vec<Photo>, timeline: &mut Timeline, photo: Photo) -> Option<usize> {
    if photos.iter().any(|p| p.id == photo.id) {
        warn!("Photo {} already in the show, not inserting", photo.id);
        return None;
    }

    if photos.is_empty() {
        info!("Inserted {} into empty show", photo.id);
        photos.push(photo);
        timeline.set_time(0.0);
        return Some(0);
    }

    let n = photos.len() as i64;
    let index = timeline.current_index();
    let wrapped = index.rem_euclid(n) as usize;
    let cycles = index.div_euclid(n);

    // Rebuild time from the index so a boundary stays a boundary
    let offset = timeline.time_offset();
    let shifted = timeline.start_of(index.saturating_add(cycles)) + offset;
    timeline.set_time(shifted);
    let position = wrapped + 1;
    info!("Inserted {} at position {} (shifted {} cycles)", photo.id, position, cycles);
    photos.insert(position, photo);
    Some(position)
}
