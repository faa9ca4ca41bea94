//! Error disambiguation tables.
//!
//! When a native call fails, the adapter stats the paths involved and
//! feeds the outcomes through these pure functions to pick the error kind.
//! `Reraise` means no probe explained the failure and the native error is
//! passed through unchanged.

/// What a follow-up `stat` found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Missing,
    File,
    Directory,
}

impl Probe {
    pub fn exists(self) -> bool {
        self != Probe::Missing
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MakedirOutcome {
    /// The directory is already there and recreation is allowed.
    Accept,
    AlreadyExists,
    TargetIsFile,
    ParentIsFile,
    MissingParent,
    /// Create the parent chain, then retry the leaf.
    CreateParent,
    Reraise,
}

/// Resolve a failed `mkdir` from probes of the target and its parent.
pub fn resolve_makedir(
    target: Probe,
    parent: Probe,
    recursive: bool,
    allow_recreate: bool,
) -> MakedirOutcome {
    match (target, parent) {
        (Probe::Directory, _) if allow_recreate => MakedirOutcome::Accept,
        (Probe::Directory, _) => MakedirOutcome::AlreadyExists,
        (Probe::File, _) => MakedirOutcome::TargetIsFile,
        (Probe::Missing, Probe::Directory) => MakedirOutcome::Reraise,
        (Probe::Missing, Probe::File) => MakedirOutcome::ParentIsFile,
        (Probe::Missing, Probe::Missing) if recursive => MakedirOutcome::CreateParent,
        (Probe::Missing, Probe::Missing) => MakedirOutcome::MissingParent,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    NotFound,
    IsDirectory,
    Reraise,
}

/// Resolve a failed `remove` from a probe of the target.
pub fn resolve_remove(target: Probe) -> RemoveOutcome {
    match target {
        Probe::Missing => RemoveOutcome::NotFound,
        Probe::Directory => RemoveOutcome::IsDirectory,
        Probe::File => RemoveOutcome::Reraise,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirOutcome {
    NotFound,
    NotADirectory,
    NotEmpty,
    Reraise,
}

/// Resolve a failed `rmdir` or `listdir`.
///
/// `has_children` is only consulted when the target is a directory.
pub fn resolve_dir(target: Probe, has_children: bool) -> DirOutcome {
    match target {
        Probe::Missing => DirOutcome::NotFound,
        Probe::File => DirOutcome::NotADirectory,
        Probe::Directory if has_children => DirOutcome::NotEmpty,
        Probe::Directory => DirOutcome::Reraise,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    SourceNotFound,
    DestinationExists,
    MissingParent,
    Reraise,
}

/// Resolve a failed `rename` from probes of the source, the destination
/// and the destination's parent, checked in that order.
pub fn resolve_move(source: Probe, destination: Probe, dest_parent: Probe) -> MoveOutcome {
    if !source.exists() {
        MoveOutcome::SourceNotFound
    } else if destination.exists() {
        MoveOutcome::DestinationExists
    } else if dest_parent != Probe::Directory {
        MoveOutcome::MissingParent
    } else {
        MoveOutcome::Reraise
    }
}
