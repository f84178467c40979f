//! Purpose: The ordered command table and its longest-match lookup.
//! Exports: `Action`, `Entry`, `COMMANDS`, `lookup`.
//! Role: Maps the first one to three tokens of a line onto a handler or a help node.
//! Invariants: Table order is priority; the first entry at each match length wins.
//! Invariants: Name matching is ASCII case-insensitive.

/// Handler bound to an invocable table entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Action {
    Active,
    Clean,
    CreatePrimary,
    CreateExtended,
    CreateLogical,
    DeleteSlot,
    DeletePartition,
    DetailDisk,
    DetailPartition,
    DetailVolume,
    DumpDisk,
    DumpPartition,
    Help,
    Inactive,
    ListDisk,
    ListPartition,
    ListVolume,
    Rescan,
    SelectDisk,
    SelectPartition,
    SelectVolume,
    SetId,
    UniqueIdDisk,
}

#[derive(Debug)]
pub enum Entry {
    Leaf {
        names: &'static [&'static str],
        action: Action,
        help: &'static str,
        usage: &'static str,
    },
    /// Not invocable; matching it shows its help and sub-commands.
    HelpOnly {
        names: &'static [&'static str],
        help: &'static str,
    },
}

impl Entry {
    pub fn names(&self) -> &'static [&'static str] {
        match self {
            Entry::Leaf { names, .. } | Entry::HelpOnly { names, .. } => names,
        }
    }

    pub fn help(&self) -> &'static str {
        match self {
            Entry::Leaf { help, .. } | Entry::HelpOnly { help, .. } => help,
        }
    }

    pub fn usage(&self) -> Option<&'static str> {
        match self {
            Entry::Leaf { usage, .. } => Some(usage),
            Entry::HelpOnly { .. } => None,
        }
    }

    fn matches(&self, tokens: &[String], depth: usize) -> bool {
        let names = self.names();
        names.len() >= depth
            && tokens.len() >= depth
            && names
                .iter()
                .zip(tokens)
                .take(depth)
                .all(|(name, token)| token.eq_ignore_ascii_case(name))
    }

    /// True when `self` sits exactly one level below `parent`.
    pub fn is_child_of(&self, parent: &Entry) -> bool {
        let names = self.names();
        let parent_names = parent.names();
        names.len() == parent_names.len() + 1
            && names
                .iter()
                .zip(parent_names)
                .all(|(name, parent_name)| name == parent_name)
    }
}

macro_rules! leaf {
    ([$($name:literal),+], $action:ident, $help:literal, $usage:literal) => {
        Entry::Leaf {
            names: &[$($name),+],
            action: Action::$action,
            help: $help,
            usage: $usage,
        }
    };
}

macro_rules! node {
    ([$($name:literal),+], $help:literal) => {
        Entry::HelpOnly {
            names: &[$($name),+],
            help: $help,
        }
    };
}

pub static COMMANDS: &[Entry] = &[
    leaf!(["active"], Active, "Mark the selected partition as active.", "ACTIVE"),
    leaf!(["clean"], Clean, "Clear the configuration information, or all information, off the disk.", "CLEAN [ALL]"),
    node!(["create"], "Create a partition."),
    node!(["create", "partition"], "Create a partition."),
    leaf!(["create", "partition", "primary"], CreatePrimary, "Create a primary partition.", "CREATE PARTITION PRIMARY [SIZE=<N>] [ID=<BYTE>]"),
    leaf!(["create", "partition", "extended"], CreateExtended, "Create an extended partition.", "CREATE PARTITION EXTENDED [SIZE=<N>]"),
    leaf!(["create", "partition", "logical"], CreateLogical, "Create a logical drive.", "CREATE PARTITION LOGICAL [SIZE=<N>] [ID=<BYTE>]"),
    leaf!(["create", "primary"], CreatePrimary, "Create a primary partition.", "CREATE PRIMARY [SIZE=<N>] [ID=<BYTE>]"),
    leaf!(["create", "extended"], CreateExtended, "Create an extended partition.", "CREATE EXTENDED [SIZE=<N>]"),
    leaf!(["create", "logical"], CreateLogical, "Create a logical drive.", "CREATE LOGICAL [SIZE=<N>] [ID=<BYTE>]"),
    leaf!(["delete"], DeleteSlot, "Delete an MBR partition table slot.", "DELETE <N>   (N = slot 1-4)"),
    leaf!(["delete", "partition"], DeletePartition, "Delete the selected partition.", "DELETE PARTITION"),
    node!(["detail"], "Provide details about an object."),
    leaf!(["detail", "disk"], DetailDisk, "Display disk properties.", "DETAIL DISK"),
    leaf!(["detail", "partition"], DetailPartition, "Display partition properties.", "DETAIL PARTITION"),
    leaf!(["detail", "volume"], DetailVolume, "Display volume properties.", "DETAIL VOLUME"),
    node!(["dump"], "Dump a sector of the selected disk or partition."),
    leaf!(["dump", "disk"], DumpDisk, "Dump a sector of the selected disk.", "DUMP DISK <SECTOR>"),
    leaf!(["dump", "partition"], DumpPartition, "Dump a sector of the selected partition.", "DUMP PARTITION <SECTOR>"),
    node!(["exit"], "Exit DiskPart."),
    leaf!(["help"], Help, "Display a list of commands.", "HELP [<COMMAND> [<SUBCOMMAND>]]"),
    leaf!(["inactive"], Inactive, "Mark the selected partition as inactive.", "INACTIVE"),
    node!(["list"], "Display a list of objects."),
    leaf!(["list", "disk"], ListDisk, "Display a list of disks.", "LIST DISK"),
    leaf!(["list", "partition"], ListPartition, "Display a list of partitions on the selected disk.", "LIST PARTITION"),
    leaf!(["list", "volume"], ListVolume, "Display a list of volumes.", "LIST VOLUME"),
    node!(["rem"], "Does nothing. This is used to comment scripts."),
    leaf!(["rescan"], Rescan, "Rescan the computer looking for disks and volumes.", "RESCAN"),
    node!(["select"], "Shift the focus to an object."),
    leaf!(["select", "disk"], SelectDisk, "Shift the focus to a disk.", "SELECT DISK [<N> | SYSTEM | NEXT]"),
    leaf!(["select", "partition"], SelectPartition, "Shift the focus to a partition.", "SELECT PARTITION [<N>]"),
    leaf!(["select", "volume"], SelectVolume, "Shift the focus to a volume.", "SELECT VOLUME [<N>]"),
    leaf!(["setid"], SetId, "Change the partition type.", "SETID ID=<BYTE>"),
    node!(["uniqueid"], "Display or set the identifier of a disk."),
    leaf!(["uniqueid", "disk"], UniqueIdDisk, "Display or set the MBR signature of the selected disk.", "UNIQUEID DISK [ID=<8 HEX DIGITS>]"),
];

/// Longest match over `tokens`: a three-word match beats two words beats one.
pub fn lookup(tokens: &[String]) -> Option<&'static Entry> {
    let mut by_depth: [Option<&'static Entry>; 3] = [None, None, None];
    for entry in COMMANDS {
        for (depth, slot) in by_depth.iter_mut().enumerate() {
            if slot.is_none() && entry.matches(tokens, depth + 1) {
                *slot = Some(entry);
            }
        }
    }
    by_depth.into_iter().rev().flatten().next()
}

#[cfg(test)]
mod tests {
    use super::{Action, COMMANDS, Entry, lookup};

    fn tokens(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_string).collect()
    }

    fn action(line: &str) -> Option<Action> {
        match lookup(&tokens(line))? {
            Entry::Leaf { action, .. } => Some(*action),
            Entry::HelpOnly { .. } => None,
        }
    }

    #[test]
    fn longest_match_wins_case_insensitively() {
        assert_eq!(action("SELECT Disk 1"), Some(Action::SelectDisk));
        assert_eq!(action("create partition logical size=8"), Some(Action::CreateLogical));
        assert_eq!(action("create primary size=100"), Some(Action::CreatePrimary));
        assert_eq!(action("delete partition"), Some(Action::DeletePartition));
        assert_eq!(action("delete 2"), Some(Action::DeleteSlot));
    }

    #[test]
    fn help_only_nodes_match_but_do_not_invoke() {
        let entry = lookup(&tokens("select")).expect("select");
        assert!(matches!(entry, Entry::HelpOnly { .. }));
        let entry = lookup(&tokens("create partition")).expect("create partition");
        assert_eq!(entry.names(), &["create", "partition"]);
        assert!(action("list bogus").is_none());
    }

    #[test]
    fn unknown_commands_have_no_match() {
        assert!(lookup(&tokens("format fs=ntfs")).is_none());
        assert!(lookup(&[]).is_none());
    }

    #[test]
    fn children_are_one_level_below() {
        let select = lookup(&tokens("select")).expect("select");
        let children = COMMANDS
            .iter()
            .filter(|entry| entry.is_child_of(select))
            .map(|entry| entry.names()[1])
            .collect::<Vec<_>>();
        assert_eq!(children, vec!["disk", "partition", "volume"]);
    }
}
