//! # Tree Harvester
//!
//! Walks a hierarchical source depth-first and yields every reachable
//! document exactly once, with its resolved parent path.
//!
//! ## Traversal
//!
//! - One paginated listing per folder; a folder is descended into as soon as
//!   it is met, before the rest of its parent's page.
//! - Shortcuts to folders are descended into under the shortcut's name.
//! - Shortcuts to files are yielded under the shortcut's name and path, but
//!   with the target's id and kind.
//! - Every descended folder id is remembered and never walked twice.
//!   Reaching a folder again through another branch is logged and skipped;
//!   reaching one of the current folder's ancestors is a cycle, handled by
//!   [`CyclePolicy`].
//! - Transient listing failures below the root are logged and the folder is
//!   skipped.

use bridge_traits::tree::{NodeKind, RemoteNode, TreeSource};
use core_runtime::config::{CollisionPolicy, CyclePolicy};
use futures::stream::{self, BoxStream, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::lister::canonical_document_name;
use crate::mime;
use crate::naming::DocumentSet;
use crate::{Result, SyncError};

/// A document found in the tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// `directory/name`, or just `name` at the root
    pub path: String,
    /// Names of the enclosing folders joined with `/` (empty at the root)
    pub directory: String,
    pub name: String,
    /// Content id; the target's id when reached through a shortcut
    pub id: String,
    /// Content kind; the target's kind when reached through a shortcut
    pub kind: NodeKind,
    /// Id of the shortcut this entry was reached through
    pub shortcut_id: Option<String>,
    pub mime_type: Option<String>,
    pub md5_checksum: Option<String>,
    pub modified_time: Option<String>,
}

impl RemoteEntry {
    /// Whether content must be exported instead of downloaded
    pub fn needs_export(&self) -> bool {
        match (&self.md5_checksum, &self.mime_type) {
            (Some(_), _) => false,
            (None, Some(mime_type)) => mime::is_native(mime_type),
            // No checksum and no type: only export can produce content
            (None, None) => true,
        }
    }
}

fn join_path(directory: &str, name: &str) -> String {
    if directory.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", directory, name)
    }
}

/// One folder being listed
struct Frame {
    folder_id: String,
    path: String,
    token: Option<String>,
    buffer: VecDeque<RemoteNode>,
    exhausted: bool,
}

impl Frame {
    fn new(folder_id: String, path: String) -> Self {
        Self {
            folder_id,
            path,
            token: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }
}

struct WalkState<'a> {
    source: &'a dyn TreeSource,
    drive_id: Option<&'a str>,
    cycle_policy: CyclePolicy,
    stack: Vec<Frame>,
    visited: HashSet<String>,
}

impl WalkState<'_> {
    /// Push `folder_id` unless it was already walked
    fn descend(&mut self, folder_id: String, path: String) -> Result<()> {
        // The stack holds exactly the ancestors of the folder being listed
        let is_ancestor = self.stack.iter().any(|frame| frame.folder_id == folder_id);

        if is_ancestor {
            return match self.cycle_policy {
                CyclePolicy::Skip => {
                    warn!(folder_id = %folder_id, path = %path, "Folder cycle detected, not descending again");
                    Ok(())
                }
                CyclePolicy::Error => Err(SyncError::TraversalCycle { folder_id }),
            };
        }
        if !self.visited.insert(folder_id.clone()) {
            warn!(folder_id = %folder_id, path = %path, "Folder already visited, not descending again");
            return Ok(());
        }
        self.stack.push(Frame::new(folder_id, path));
        Ok(())
    }

    /// Turn a listed node into an entry, descending when it is a folder
    fn visit(&mut self, node: RemoteNode, directory: &str) -> Result<Option<RemoteEntry>> {
        let path = join_path(directory, &node.name);

        match (node.kind, node.shortcut) {
            (NodeKind::Folder, _) => {
                self.descend(node.id, path)?;
                Ok(None)
            }
            (NodeKind::Shortcut, Some(target)) if target.target_kind == NodeKind::Folder => {
                self.descend(target.target_id, path)?;
                Ok(None)
            }
            (NodeKind::Shortcut, Some(target)) => Ok(Some(RemoteEntry {
                path,
                directory: directory.to_string(),
                name: node.name,
                id: target.target_id,
                kind: target.target_kind,
                shortcut_id: Some(node.id),
                mime_type: target.target_mime_type,
                md5_checksum: node.md5_checksum,
                modified_time: node.modified_time,
            })),
            (NodeKind::Shortcut, None) => {
                warn!(id = %node.id, path = %path, "Shortcut without target, skipping");
                Ok(None)
            }
            (NodeKind::File, _) => Ok(Some(RemoteEntry {
                path,
                directory: directory.to_string(),
                name: node.name,
                id: node.id,
                kind: NodeKind::File,
                shortcut_id: None,
                mime_type: node.mime_type,
                md5_checksum: node.md5_checksum,
                modified_time: node.modified_time,
            })),
        }
    }

    /// Advance the walk until the next entry or the end of the tree
    async fn next_entry(&mut self) -> Result<Option<RemoteEntry>> {
        loop {
            let Some(frame) = self.stack.last_mut() else {
                return Ok(None);
            };

            if let Some(node) = frame.buffer.pop_front() {
                let directory = frame.path.clone();
                if let Some(entry) = self.visit(node, &directory)? {
                    return Ok(Some(entry));
                }
                continue;
            }

            if frame.exhausted {
                self.stack.pop();
                continue;
            }

            let folder_id = frame.folder_id.clone();
            let token = frame.token.take();
            let is_root = self.stack.len() == 1;

            match self.source.list_children(&folder_id, self.drive_id, token).await {
                Ok((children, next)) => {
                    debug!(folder_id = %folder_id, children = children.len(), "Listed folder page");
                    if let Some(frame) = self.stack.last_mut() {
                        frame.buffer = VecDeque::from(children);
                        match next {
                            Some(token) if !token.is_empty() => frame.token = Some(token),
                            _ => frame.exhausted = true,
                        }
                    }
                }
                Err(err) if !is_root && err.is_transient() => {
                    warn!(folder_id = %folder_id, error = %err, "Listing failed, skipping folder");
                    self.stack.pop();
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

pub struct TreeHarvester {
    source: Arc<dyn TreeSource>,
    cycle_policy: CyclePolicy,
}

impl TreeHarvester {
    pub fn new(source: Arc<dyn TreeSource>, cycle_policy: CyclePolicy) -> Self {
        Self {
            source,
            cycle_policy,
        }
    }

    pub fn source(&self) -> &Arc<dyn TreeSource> {
        &self.source
    }

    /// Lazily walk everything below `root_id`.
    ///
    /// `drive_id` scopes listings to a shared drive. Entry paths are relative
    /// to the root folder.
    pub fn harvest<'a>(
        &'a self,
        root_id: &str,
        drive_id: Option<&'a str>,
    ) -> BoxStream<'a, Result<RemoteEntry>> {
        let mut visited = HashSet::new();
        visited.insert(root_id.to_string());

        let state = WalkState {
            source: self.source.as_ref(),
            drive_id,
            cycle_policy: self.cycle_policy,
            stack: vec![Frame::new(root_id.to_string(), String::new())],
            visited,
        };

        Box::pin(stream::try_unfold(state, |mut state| async move {
            let entry = state.next_entry().await?;
            Ok::<_, SyncError>(entry.map(|entry| (entry, state)))
        }))
    }

    /// Download or export every document below `root_id` for indexing.
    ///
    /// Native documents are exported to their office format; binaries are
    /// downloaded. Files whose name does not pass the document extension
    /// filter are left out. Export failures and transient download failures
    /// skip the entry.
    #[instrument(skip(self, drive_id))]
    pub async fn collect_documents(
        &self,
        root_id: &str,
        drive_id: Option<&str>,
        policy: CollisionPolicy,
    ) -> Result<DocumentSet> {
        let mut documents = DocumentSet::new(policy);
        let mut entries = self.harvest(root_id, drive_id);
        let mut harvested = 0usize;

        while let Some(entry) = entries.try_next().await? {
            harvested += 1;

            let (name, data) = if entry.needs_export() {
                let mime_type = entry.mime_type.as_deref().unwrap_or_default();
                let Some((export_mime, extension)) = mime::office_export(mime_type) else {
                    debug!(path = %entry.path, mime_type, "Native document has no office export, skipping");
                    continue;
                };
                match self.source.export(&entry.id, export_mime).await {
                    Ok(data) => (format!("{}{}", entry.path, extension), data),
                    Err(err) => {
                        warn!(path = %entry.path, error = %err, "Export failed, skipping");
                        continue;
                    }
                }
            } else {
                match self.source.download(&entry.id).await {
                    Ok(data) => (entry.path.clone(), data),
                    Err(err) if err.is_transient() => {
                        warn!(path = %entry.path, error = %err, "Download failed, skipping");
                        continue;
                    }
                    Err(err) => return Err(err.into()),
                }
            };

            match canonical_document_name(&name) {
                Some(name) => documents.insert(&name, data)?,
                None => debug!(path = %entry.path, "Skipping file with unsupported extension"),
            }
        }

        info!(harvested, kept = documents.len(), "Collected documents from tree");
        Ok(documents)
    }
}
