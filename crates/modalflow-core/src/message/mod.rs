//! # Multimodal Messages
//!
//! The unit of data flowing through an execution graph.
//!
//! A [`Message`] carries a 64-bit uid, a creation timestamp, a typed content
//! payload (text, raw bytes, or an embedding vector), string metadata, a
//! processing trace, and an optional quality score.
//!
//! ## Ownership
//!
//! Messages are move-only: there is no `Clone` impl. A message is owned by
//! exactly one holder at any instant (a source, an in-flight
//! [`FunctionResponse`], or a downstream operator). Callers that need a copy
//! must go through an explicit factory:
//!
//! - [`Message::duplicate_with_uid`] creates an identical message under a
//!   fresh uid (user-level copies),
//! - [`Message::replicate`] creates an identical message under the *same*
//!   uid; the scheduler uses it to broadcast one record along multiple
//!   outgoing edges without reassigning ids.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod response;

pub use response::FunctionResponse;

/// Content discriminator for a message payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// UTF-8 text.
    Text,
    /// Opaque binary data.
    Binary,
    /// Encoded image bytes.
    Image,
    /// Encoded audio bytes.
    Audio,
    /// Encoded video bytes.
    Video,
    /// A dense embedding vector.
    Embedding,
    /// A payload-less record whose information lives in the metadata map.
    Metadata,
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Text => "text",
            Self::Binary => "binary",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Embedding => "embedding",
            Self::Metadata => "metadata",
        };
        f.write_str(s)
    }
}

/// Tagged content payload.
///
/// `Clone` here is internal plumbing for the explicit duplication factories
/// on [`Message`]; `Message` itself stays move-only.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    /// Text payload.
    Text(String),
    /// Byte payload (binary, image, audio, video).
    Bytes(Vec<u8>),
    /// Embedding vector payload.
    Vector(Vec<f32>),
}

/// A multimodal record flowing through the graph.
///
/// Constructed through the typed factories ([`Message::text`],
/// [`Message::binary`], [`Message::vector`], [`Message::metadata_only`]);
/// the creator is responsible for uid assignment and the engine never
/// reassigns uids when forwarding.
#[derive(Debug)]
pub struct Message {
    uid: u64,
    timestamp: u64,
    content_type: ContentType,
    content: Content,
    metadata: BTreeMap<String, String>,
    processing_path: Vec<String>,
    quality_score: Option<f32>,
}

impl Message {
    fn new(uid: u64, content_type: ContentType, content: Content) -> Self {
        Self {
            uid,
            timestamp: now_millis(),
            content_type,
            content,
            metadata: BTreeMap::new(),
            processing_path: Vec::new(),
            quality_score: None,
        }
    }

    /// Creates a text message.
    #[must_use]
    pub fn text(uid: u64, text: impl Into<String>) -> Self {
        Self::new(uid, ContentType::Text, Content::Text(text.into()))
    }

    /// Creates a byte-payload message under the given content type.
    ///
    /// `content_type` should be one of the byte-backed variants (Binary,
    /// Image, Audio, Video); anything else is stored as Binary.
    #[must_use]
    pub fn binary(uid: u64, content_type: ContentType, bytes: Vec<u8>) -> Self {
        let ct = match content_type {
            ContentType::Binary | ContentType::Image | ContentType::Audio | ContentType::Video => {
                content_type
            }
            _ => ContentType::Binary,
        };
        Self::new(uid, ct, Content::Bytes(bytes))
    }

    /// Creates an embedding message.
    #[must_use]
    pub fn vector(uid: u64, vector: Vec<f32>) -> Self {
        Self::new(uid, ContentType::Embedding, Content::Vector(vector))
    }

    /// Creates a payload-less message whose information is carried entirely
    /// by the metadata map.
    #[must_use]
    pub fn metadata_only(uid: u64) -> Self {
        Self::new(uid, ContentType::Metadata, Content::Text(String::new()))
    }

    /// The unique 64-bit identifier assigned at construction.
    #[must_use]
    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// Creation timestamp, milliseconds since the Unix epoch.
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// The content discriminator tag.
    #[must_use]
    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    /// The content payload.
    #[must_use]
    pub fn content(&self) -> &Content {
        &self.content
    }

    /// Whether the payload is text.
    #[must_use]
    pub fn is_text(&self) -> bool {
        matches!(self.content, Content::Text(_))
    }

    /// The text payload, if any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match &self.content {
            Content::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The byte payload, if any.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.content {
            Content::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// The embedding payload, if any.
    #[must_use]
    pub fn as_vector(&self) -> Option<&[f32]> {
        match &self.content {
            Content::Vector(v) => Some(v),
            _ => None,
        }
    }

    /// Replaces the content payload, updating the discriminator tag for the
    /// text and vector variants. Byte payloads keep the existing tag so an
    /// image stays an image.
    pub fn set_content(&mut self, content: Content) {
        self.content_type = match (&content, self.content_type) {
            (Content::Text(_), _) => ContentType::Text,
            (Content::Vector(_), _) => ContentType::Embedding,
            (Content::Bytes(_), ct) => match ct {
                ContentType::Image | ContentType::Audio | ContentType::Video => ct,
                _ => ContentType::Binary,
            },
        };
        self.content = content;
    }

    /// Inserts or overwrites a metadata entry.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    /// Looks up a metadata entry.
    #[must_use]
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// The full metadata map, ordered by key.
    #[must_use]
    pub fn metadata_entries(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Appends a label to the processing trace.
    pub fn add_processing_step(&mut self, step: impl Into<String>) {
        self.processing_path.push(step.into());
    }

    /// The ordered list of processing-step labels.
    #[must_use]
    pub fn processing_path(&self) -> &[String] {
        &self.processing_path
    }

    /// The optional quality score in `[0, 1]`.
    #[must_use]
    pub fn quality_score(&self) -> Option<f32> {
        self.quality_score
    }

    /// Sets the quality score, clamped to `[0, 1]`.
    pub fn set_quality_score(&mut self, score: f32) {
        self.quality_score = Some(score.clamp(0.0, 1.0));
    }

    /// Builds an identical message under a fresh uid.
    ///
    /// This is the user-facing copy factory; uid assignment stays with the
    /// caller, as with the other constructors.
    #[must_use]
    pub fn duplicate_with_uid(&self, uid: u64) -> Self {
        Self { uid, ..self.replicate() }
    }

    /// Builds an identical message under the *same* uid.
    ///
    /// Used by the scheduler to deliver one record along every outgoing
    /// edge of a fan-out node; forwarding never reassigns uids.
    #[must_use]
    pub fn replicate(&self) -> Self {
        Self {
            uid: self.uid,
            timestamp: self.timestamp,
            content_type: self.content_type,
            content: self.content.clone(),
            metadata: self.metadata.clone(),
            processing_path: self.processing_path.clone(),
            quality_score: self.quality_score,
        }
    }
}

/// Monotonic uid source for message creators.
///
/// Each generator is an independent counter; there is no global uid space.
/// Sources that must not collide with one another should carve out disjoint
/// bases via [`UidGenerator::with_base`].
#[derive(Debug)]
pub struct UidGenerator {
    next: AtomicU64,
}

impl UidGenerator {
    /// Creates a generator starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::with_base(0)
    }

    /// Creates a generator starting at `base`.
    #[must_use]
    pub fn with_base(base: u64) -> Self {
        Self { next: AtomicU64::new(base) }
    }

    /// Returns the next uid.
    pub fn next_uid(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for UidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
