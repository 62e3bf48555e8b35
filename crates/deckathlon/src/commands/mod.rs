//! Command dispatch: bridges CLI args -> registry operations -> output.

pub mod data;
pub mod poll;
pub mod query;
pub mod util;

use crate::Session;
use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

pub async fn dispatch(cmd: Command, session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Types => data::types(session, global),
        Command::List(args) => data::list(session, args, global).await,
        Command::Get(args) => data::get(session, args, global).await,
        Command::Blank(args) => data::blank(session, args, global).await,
        Command::Save(args) => data::save(session, args, global).await,
        Command::Remove(args) => data::remove(session, args, global).await,
        Command::Query(args) => query::handle(session, args, global).await,
        Command::Poll(args) => poll::handle(session, args, global).await,
    }
}
