use serde::{Deserialize, Serialize};

/// A file offered by a peer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct File {
    pub filename: String,
    pub size: u64,
    pub extension: String,
    pub bit_rate: Option<u32>,
    pub sample_rate: Option<u32>,
    pub bit_depth: Option<u32>,
    /// Length in seconds
    pub length: Option<u32>,
    pub is_variable_bit_rate: Option<bool>,
    pub is_locked: bool,
}

impl File {
    /// Build a file, deriving the extension from the filename
    pub fn new(filename: impl Into<String>, size: u64) -> Self {
        let filename = filename.into();
        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default();

        Self {
            filename,
            size,
            extension,
            ..Default::default()
        }
    }
}

/// One peer's answer to a search, as persisted with the finalized record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub username: String,
    /// Resolved once, when the search is finalized
    pub user_group: Option<String>,
    pub token: u32,
    pub upload_speed: u32,
    pub queue_length: u64,
    pub has_free_upload_slot: bool,
    pub file_count: usize,
    pub locked_file_count: usize,
    pub files: Vec<File>,
    pub locked_files: Vec<File>,
}
