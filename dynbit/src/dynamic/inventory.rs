//! Per instance ledger of the variable parts a dynamic base has written.
//!
//! The ledger is a set stored under the base field's own key, `{scope}:{pk}:{base}`.

use crate::storage::entry;
use crate::storage::{KeyRead, WriteCtx};
use crate::AppError;
use std::collections::BTreeSet;

pub fn add(ctx: &mut WriteCtx<'_>, key: &str, part: &str) -> Result<bool, AppError> {
    let parts = [part.to_string()];
    ctx.update(key, |e| entry::sadd(key, e, &parts)).map(|added| added > 0)
}

pub fn remove(ctx: &mut WriteCtx<'_>, key: &str, part: &str) -> Result<bool, AppError> {
    let parts = [part.to_string()];
    ctx.update(key, |e| entry::srem(key, e, &parts)).map(|removed| removed > 0)
}

pub fn members(ctx: &dyn KeyRead, key: &str) -> Result<BTreeSet<String>, AppError> {
    entry::smembers(key, ctx.entry(key)?.as_ref())
}

pub fn clear(ctx: &mut WriteCtx<'_>, key: &str) -> Result<(), AppError> {
    ctx.put(key, None)
}
