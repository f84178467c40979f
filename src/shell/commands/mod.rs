// Command handlers, one module per command family.
use std::io::Write;

use crate::core::error::Error;
use crate::shell::Session;
use crate::shell::table::Action;

mod create;
mod delete;
mod detail;
mod disk;
mod flags;
pub(crate) mod help;
mod list;
mod select;

pub(crate) fn invoke<W: Write>(
    action: Action,
    session: &mut Session<W>,
    args: &[String],
) -> Result<(), Error> {
    tracing::debug!(?action, argc = args.len(), "dispatch");
    match action {
        Action::Active => flags::active(session, args),
        Action::Clean => disk::clean(session, args),
        Action::CreatePrimary => create::primary(session, args),
        Action::CreateExtended => create::extended(session, args),
        Action::CreateLogical => create::logical(session, args),
        Action::DeleteSlot => delete::slot(session, args),
        Action::DeletePartition => delete::partition(session, args),
        Action::DetailDisk => detail::disk(session, args),
        Action::DetailPartition => detail::partition(session, args),
        Action::DetailVolume => detail::volume(session, args),
        Action::DumpDisk => disk::dump_disk(session, args),
        Action::DumpPartition => disk::dump_partition(session, args),
        Action::Help => help::help(session, args),
        Action::Inactive => flags::inactive(session, args),
        Action::ListDisk => list::disk(session, args),
        Action::ListPartition => list::partition(session, args),
        Action::ListVolume => list::volume(session, args),
        Action::Rescan => disk::rescan(session, args),
        Action::SelectDisk => select::disk(session, args),
        Action::SelectPartition => select::partition(session, args),
        Action::SelectVolume => select::volume(session, args),
        Action::SetId => flags::setid(session, args),
        Action::UniqueIdDisk => disk::uniqueid(session, args),
    }
}
