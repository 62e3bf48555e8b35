//! Ad-hoc queries against the API root.

use deckathlon_api::Method;
use deckathlon_core::CachePolicy;

use super::util;
use crate::Session;
use crate::cli::{GlobalOpts, HttpMethod, QueryArgs};
use crate::error::CliError;
use crate::output;

pub async fn handle(session: &Session, args: QueryArgs, global: &GlobalOpts) -> Result<(), CliError> {
    if !session.registry.has_backend() {
        return Err(CliError::Validation {
            field: "--root-url".into(),
            reason: "queries need a backend".into(),
        });
    }

    let data = args.data.as_deref().map(util::read_json).transpose()?;
    let mut query = session
        .registry
        .query(args.url)
        .method(method(args.method))
        .maybe_data(data);
    if let Some(secs) = args.cache {
        query = query.cache(CachePolicy::Seconds(secs));
    }

    let value = query.send().await?;
    let out = output::render_value(global.output, &value);
    output::print_output(&out, global.quiet);
    Ok(())
}

fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::Get,
        HttpMethod::Post => Method::Post,
        HttpMethod::Put => Method::Put,
        HttpMethod::Delete => Method::Delete,
    }
}
