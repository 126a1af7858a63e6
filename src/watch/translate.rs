//! Raw notification translation
//!
//! Maps native `notify` events onto the five watch event types. The
//! tracker remembers which paths under the root are directories so that
//! removals (where the entry is already gone) can still be classified.

use notify::event::{CreateKind, MetadataKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::events::WatchEventType;

#[derive(Debug)]
pub struct DirTracker {
    root: PathBuf,
    dirs: HashSet<PathBuf>,
}

impl DirTracker {
    /// Record the directories currently under `root` without reporting them
    pub fn scan(root: &Path) -> Self {
        let dirs = WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_dir())
            .map(|entry| entry.into_path())
            .collect();

        Self {
            root: root.to_path_buf(),
            dirs,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_known_dir(&self, path: &Path) -> bool {
        self.dirs.contains(path)
    }

    /// Translate one native event into zero or more watch events
    pub fn translate(&mut self, event: &Event) -> Vec<(WatchEventType, PathBuf)> {
        let mut out = Vec::new();

        match &event.kind {
            EventKind::Create(kind) => {
                for path in &event.paths {
                    let is_dir = match kind {
                        CreateKind::Folder => Some(true),
                        CreateKind::File => Some(false),
                        _ => None,
                    };
                    self.created(path, is_dir, &mut out);
                }
            }
            EventKind::Modify(ModifyKind::Name(mode)) => match (mode, event.paths.as_slice()) {
                (RenameMode::From, paths) => {
                    for path in paths {
                        self.removed(path, None, &mut out);
                    }
                }
                (RenameMode::To, paths) => {
                    for path in paths {
                        self.created(path, None, &mut out);
                    }
                }
                (RenameMode::Both, [from, to]) => {
                    self.removed(from, None, &mut out);
                    self.created(to, None, &mut out);
                }
                (_, paths) => {
                    for path in paths {
                        if path.symlink_metadata().is_ok() {
                            self.created(path, None, &mut out);
                        } else {
                            self.removed(path, None, &mut out);
                        }
                    }
                }
            },
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::AccessTime)) => {}
            EventKind::Modify(_) => {
                for path in &event.paths {
                    self.changed(path, &mut out);
                }
            }
            EventKind::Remove(kind) => {
                for path in &event.paths {
                    let is_dir = match kind {
                        RemoveKind::Folder => Some(true),
                        RemoveKind::File => Some(false),
                        _ => None,
                    };
                    self.removed(path, is_dir, &mut out);
                }
            }
            EventKind::Access(_) | EventKind::Any | EventKind::Other => {}
        }

        out
    }

    fn created(
        &mut self,
        path: &Path,
        is_dir: Option<bool>,
        out: &mut Vec<(WatchEventType, PathBuf)>,
    ) {
        if !self.in_scope(path) {
            return;
        }

        let is_dir = is_dir.unwrap_or_else(|| {
            path.symlink_metadata()
                .map(|m| m.file_type().is_dir())
                .unwrap_or(false)
        });

        if is_dir {
            // a directory moved in brings its subdirectories along
            self.dirs.insert(path.to_path_buf());
            for entry in WalkDir::new(path)
                .min_depth(1)
                .follow_links(false)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|entry| entry.file_type().is_dir())
            {
                self.dirs.insert(entry.into_path());
            }
            out.push((WatchEventType::AddDir, path.to_path_buf()));
        } else {
            out.push((WatchEventType::Add, path.to_path_buf()));
        }
    }

    fn removed(
        &mut self,
        path: &Path,
        is_dir: Option<bool>,
        out: &mut Vec<(WatchEventType, PathBuf)>,
    ) {
        if !path.starts_with(&self.root) || path == self.root {
            return;
        }

        let was_dir = self.dirs.remove(path) || is_dir == Some(true);
        if was_dir {
            self.dirs.retain(|dir| !dir.starts_with(path));
            out.push((WatchEventType::UnlinkDir, path.to_path_buf()));
        } else {
            out.push((WatchEventType::Unlink, path.to_path_buf()));
        }
    }

    fn changed(&mut self, path: &Path, out: &mut Vec<(WatchEventType, PathBuf)>) {
        if !self.in_scope(path) || self.dirs.contains(path) {
            return;
        }
        match path.symlink_metadata() {
            Ok(metadata) if !metadata.is_dir() => {
                out.push((WatchEventType::Change, path.to_path_buf()));
            }
            _ => {}
        }
    }

    /// Under the root, and not reached through a symlinked directory
    fn in_scope(&self, path: &Path) -> bool {
        if !path.starts_with(&self.root) || path == self.root {
            return false;
        }

        !path
            .ancestors()
            .skip(1)
            .take_while(|ancestor| *ancestor != self.root)
            .any(|ancestor| {
                ancestor
                    .symlink_metadata()
                    .map(|m| m.file_type().is_symlink())
                    .unwrap_or(false)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::DataChange;

    fn event(kind: EventKind, paths: &[&Path]) -> Event {
        let mut event = Event::new(kind);
        for path in paths {
            event = event.add_path(path.to_path_buf());
        }
        event
    }

    #[test]
    fn test_scan_ignores_initial_entries_but_knows_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/file.txt"), "x").unwrap();

        let tracker = DirTracker::scan(dir.path());
        assert!(tracker.is_known_dir(&dir.path().join("a")));
        assert!(tracker.is_known_dir(&dir.path().join("a/b")));
        assert!(!tracker.is_known_dir(&dir.path().join("a/file.txt")));
    }

    #[test]
    fn test_create_file_and_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = DirTracker::scan(dir.path());

        let file = dir.path().join("new.txt");
        std::fs::write(&file, "x").unwrap();
        let out = tracker.translate(&event(EventKind::Create(CreateKind::File), &[&file]));
        assert_eq!(out, vec![(WatchEventType::Add, file.clone())]);

        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        let out = tracker.translate(&event(EventKind::Create(CreateKind::Any), &[&sub]));
        assert_eq!(out, vec![(WatchEventType::AddDir, sub.clone())]);
        assert!(tracker.is_known_dir(&sub));
    }

    #[test]
    fn test_remove_any_uses_known_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("gone/inner")).unwrap();
        let mut tracker = DirTracker::scan(dir.path());

        let gone = dir.path().join("gone");
        let file = dir.path().join("f.txt");
        std::fs::remove_dir_all(&gone).unwrap();

        let out = tracker.translate(&event(EventKind::Remove(RemoveKind::Any), &[&gone, &file]));
        assert_eq!(
            out,
            vec![
                (WatchEventType::UnlinkDir, gone.clone()),
                (WatchEventType::Unlink, file.clone()),
            ]
        );
        assert!(!tracker.is_known_dir(&gone.join("inner")));
    }

    #[test]
    fn test_modify_reports_change_for_files_only() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, "x").unwrap();
        std::fs::create_dir(dir.path().join("d")).unwrap();
        let mut tracker = DirTracker::scan(dir.path());

        let kind = EventKind::Modify(ModifyKind::Data(DataChange::Any));
        let out = tracker.translate(&event(kind, &[&file, &dir.path().join("d")]));
        assert_eq!(out, vec![(WatchEventType::Change, file.clone())]);

        let access = EventKind::Modify(ModifyKind::Metadata(MetadataKind::AccessTime));
        assert!(tracker.translate(&event(access, &[&file])).is_empty());
    }

    #[test]
    fn test_rename_both() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("old.txt");
        let to = dir.path().join("new.txt");
        std::fs::write(&to, "x").unwrap();
        let mut tracker = DirTracker::scan(dir.path());

        let kind = EventKind::Modify(ModifyKind::Name(RenameMode::Both));
        let out = tracker.translate(&event(kind, &[&from, &to]));
        assert_eq!(
            out,
            vec![(WatchEventType::Unlink, from), (WatchEventType::Add, to)]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_events_through_symlinked_dir_are_dropped() {
        let outside = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        let mut tracker = DirTracker::scan(dir.path());

        let through = dir.path().join("link/file.txt");
        std::fs::write(&through, "x").unwrap();
        let out = tracker.translate(&event(EventKind::Create(CreateKind::File), &[&through]));
        assert!(out.is_empty());
    }

    #[test]
    fn test_root_itself_is_not_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = DirTracker::scan(dir.path());
        let kind = EventKind::Modify(ModifyKind::Data(DataChange::Any));
        assert!(tracker.translate(&event(kind, &[dir.path()])).is_empty());
    }
}
