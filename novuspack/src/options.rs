use std::path::PathBuf;

/// How a host file is named and recorded inside the package.
///
/// At most one of `stored_path`, `base_path`, `preserve_depth` and `flatten`
/// may be set. With none of them, an absolute source path is stored relative
/// to the session base.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddFileOptions {
    /// Explicit package path
    pub stored_path: Option<String>,
    /// Host directory stripped from the source path
    pub base_path: Option<PathBuf>,
    /// Parent directories kept above the file name; `-1` keeps them all
    pub preserve_depth: Option<i32>,
    /// Store under the file name alone
    pub flatten: bool,
    pub allow_overwrite: bool,
    /// Skip duplicate detection and always store a new payload
    pub allow_duplicate: bool,
    pub follow_symlinks: bool,
    pub preserve_permissions: bool,
    pub preserve_ownership: bool,
    pub file_type: u16,
}

impl Default for AddFileOptions {
    fn default() -> AddFileOptions {
        AddFileOptions {
            stored_path: None,
            base_path: None,
            preserve_depth: None,
            flatten: false,
            allow_overwrite: false,
            allow_duplicate: false,
            follow_symlinks: true,
            preserve_permissions: true,
            preserve_ownership: false,
            file_type: 0,
        }
    }
}

impl AddFileOptions {
    pub fn stored_at(path: impl Into<String>) -> AddFileOptions {
        AddFileOptions {
            stored_path: Some(path.into()),
            ..AddFileOptions::default()
        }
    }

    pub(crate) fn placement_count(&self) -> usize {
        [
            self.stored_path.is_some(),
            self.base_path.is_some(),
            self.preserve_depth.is_some(),
            self.flatten,
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateOptions {
    pub comment: Option<String>,
    pub vendor_id: u32,
    pub app_id: u64,
}
