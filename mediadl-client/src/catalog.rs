//! Turning a fetched message batch into downloadable media items.

use std::fmt;

use chrono::{DateTime, Local, Utc};

use crate::errors::{Error, RemoteError};
use crate::remote::{MediaHandle, MessagingClient, RawMedia, RawMessage};
use crate::retry::{RetryPolicy, retrying};

/// Message ID of the item; unique within one fetched batch.
pub type MediaId = i32;

// ─── MediaKind ────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Video,
    Document { mime_type: Option<String> },
    /// Some other attachment (location, contact, web page…).
    Unknown { mime_type: Option<String> },
}

impl MediaKind {
    /// Photo beats video beats document beats anything else.
    fn classify(media: &RawMedia) -> Self {
        if media.photo {
            Self::Photo
        } else if media.video {
            Self::Video
        } else if let Some(doc) = &media.document {
            Self::Document { mime_type: doc.mime_type.clone() }
        } else {
            Self::Unknown { mime_type: media.mime_type.clone() }
        }
    }

    fn declared_mime(&self) -> Option<&str> {
        match self {
            Self::Document { mime_type } | Self::Unknown { mime_type } => mime_type.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Photo          => f.write_str("photo"),
            Self::Video          => f.write_str("video"),
            Self::Document { .. } => f.write_str("document"),
            Self::Unknown { .. }  => f.write_str("unknown"),
        }
    }
}

// ─── MediaItem ────────────────────────────────────────────────────────────────

/// One downloadable attachment of the catalog.
#[derive(Clone, Debug)]
pub struct MediaItem {
    pub id:         MediaId,
    pub kind:       MediaKind,
    pub filename:   String,
    /// `0` when the remote side did not report a size.
    pub size_bytes: u64,
    pub timestamp:  DateTime<Utc>,
    pub handle:     MediaHandle,
}

impl MediaItem {
    fn from_raw(id: MediaId, date: i64, media: RawMedia) -> Self {
        let kind = MediaKind::classify(&media);
        let filename = match &kind {
            MediaKind::Photo => format!("photo_{id}.jpg"),
            MediaKind::Video => format!("video_{id}.mp4"),
            MediaKind::Document { .. } => media
                .document
                .as_ref()
                .and_then(|d| d.file_name())
                .map(str::to_string)
                .unwrap_or_else(|| format!("file_{id}")),
            MediaKind::Unknown { .. } => format!("file_{id}"),
        };
        let size_bytes = media
            .size
            .or_else(|| media.document.as_ref().and_then(|d| d.size))
            .unwrap_or(0);
        let timestamp = DateTime::from_timestamp(date, 0).unwrap_or_default();

        Self { id, kind, filename, size_bytes, timestamp, handle: media.handle }
    }

    /// Declared MIME type, or one guessed from the file name.
    pub fn mime_type(&self) -> String {
        match self.kind.declared_mime() {
            Some(m) => m.to_string(),
            None    => mime_guess::from_path(&self.filename).first_or_octet_stream().to_string(),
        }
    }

    /// Short label for listings: `photo`, `video`, the document MIME, or `file`.
    pub fn type_label(&self) -> String {
        match &self.kind {
            MediaKind::Photo => "photo".into(),
            MediaKind::Video => "video".into(),
            MediaKind::Document { mime_type } => mime_type.clone().unwrap_or_else(|| "file".into()),
            MediaKind::Unknown { .. } => "file".into(),
        }
    }

    pub fn human_size(&self) -> String {
        human_size(self.size_bytes)
    }

    /// Timestamp in the local time zone, for display.
    pub fn local_date(&self) -> String {
        self.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

// ─── Building ─────────────────────────────────────────────────────────────────

/// Keep the messages that carry media, in fetch order, as catalog entries.
pub fn build_catalog(messages: impl IntoIterator<Item = RawMessage>) -> Vec<MediaItem> {
    messages
        .into_iter()
        .filter_map(|m| {
            let media = m.media?;
            Some(MediaItem::from_raw(m.id, m.date, media))
        })
        .collect()
}

/// Resolve `chat`, list its latest `limit` messages and build the catalog.
pub async fn fetch_catalog(
    client: &dyn MessagingClient,
    chat:   &str,
    limit:  usize,
    policy: &dyn RetryPolicy,
) -> Result<Vec<MediaItem>, Error> {
    let fetch_error = |source: RemoteError| Error::Fetch { chat: chat.to_string(), source };

    let entity = retrying(policy, || client.resolve_entity(chat))
        .await
        .map_err(fetch_error)?;
    tracing::debug!("[mediadl] Resolved {chat} → {entity}");

    let messages = retrying(policy, || client.fetch_messages(&entity, limit))
        .await
        .map_err(fetch_error)?;
    let total = messages.len();

    let items = build_catalog(messages);
    tracing::info!("[mediadl] Found {} media items in {total} messages of {chat}", items.len());
    Ok(items)
}

// ─── Sizes ────────────────────────────────────────────────────────────────────

/// `0 Bytes`, `512 Bytes`, `1.5 KB`, `2.25 MB`, … in 1024 steps up to GB.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".into();
    }
    let mut value = bytes as f64;
    let mut unit  = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit  += 1;
    }
    let text = format!("{value:.2}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{text} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::human_size;

    #[test]
    fn human_sizes() {
        assert_eq!(human_size(0), "0 Bytes");
        assert_eq!(human_size(512), "512 Bytes");
        assert_eq!(human_size(1024), "1 KB");
        assert_eq!(human_size(1536), "1.5 KB");
        assert_eq!(human_size(5 * 1024 * 1024 + 262_144), "5.25 MB");
        assert_eq!(human_size(3 * 1024 * 1024 * 1024), "3 GB");
        assert_eq!(human_size(2048 * 1024 * 1024 * 1024), "2048 GB");
    }
}
