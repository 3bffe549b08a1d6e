//! Diff batch application.

use super::types::VectorDiff;
use crate::error::{Error, Result};
use std::future::Future;

/// Apply a batch of diffs to `current`, returning the new sequence.
///
/// `current` is never touched: the batch is applied to one working copy, in
/// order, and only the final result is returned. Out-of-range indices on
/// `Set`, `Insert` or `Remove` are protocol violations and fail the whole
/// batch. `PopFront`/`PopBack` on an empty sequence are no-ops.
pub fn apply_diff<T, V, F>(current: &[T], batch: Vec<VectorDiff<V>>, parse: F) -> Result<Vec<T>>
where
    T: Clone,
    F: FnMut(V) -> Result<T>,
{
    apply_diff_with_replace(current, batch, parse, |_, new| new)
}

/// Like [`apply_diff`], but `Set` passes the replaced element to `replace`
/// together with the parsed value, so identity can be carried over.
pub fn apply_diff_with_replace<T, V, F, R>(
    current: &[T],
    batch: Vec<VectorDiff<V>>,
    mut parse: F,
    mut replace: R,
) -> Result<Vec<T>>
where
    T: Clone,
    F: FnMut(V) -> Result<T>,
    R: FnMut(&T, T) -> T,
{
    let mut items = current.to_vec();
    for diff in batch {
        check_index(&diff, items.len())?;
        let diff = diff.try_map(&mut parse)?;
        apply_parsed(&mut items, diff, &mut replace)?;
    }
    Ok(items)
}

/// Apply a batch whose elements need an asynchronous parse.
///
/// Every value in the batch is parsed before anything is applied, so the
/// caller observes either the whole batch or an error.
pub async fn apply_diff_async<T, V, F, Fut>(
    current: &[T],
    batch: Vec<VectorDiff<V>>,
    parse: F,
) -> Result<Vec<T>>
where
    T: Clone,
    F: Fn(V) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    // Indices are validated against the length the sequence will have at
    // each step, before any parse is started.
    let mut len = current.len();
    for diff in &batch {
        check_index(diff, len)?;
        len = diff.resulting_len(len);
    }

    let mut parsed = Vec::with_capacity(batch.len());
    for diff in batch {
        parsed.push(diff.try_map_async(&parse).await?);
    }

    let mut items = current.to_vec();
    for diff in parsed {
        apply_parsed(&mut items, diff, &mut |_, new| new)?;
    }
    Ok(items)
}

fn check_index<V>(diff: &VectorDiff<V>, len: usize) -> Result<()> {
    let (index, valid) = match diff {
        VectorDiff::Set { index, .. } | VectorDiff::Remove { index } => (*index, *index < len),
        VectorDiff::Insert { index, .. } => (*index, *index <= len),
        _ => return Ok(()),
    };

    if valid {
        Ok(())
    } else {
        Err(Error::IndexOutOfBounds {
            op: diff.name(),
            index,
            len,
        })
    }
}

fn apply_parsed<T, R>(items: &mut Vec<T>, diff: VectorDiff<T>, replace: &mut R) -> Result<()>
where
    R: FnMut(&T, T) -> T,
{
    check_index(&diff, items.len())?;

    match diff {
        VectorDiff::Set { index, value } => {
            let value = replace(&items[index], value);
            items[index] = value;
        }
        VectorDiff::PushBack { value } => items.push(value),
        VectorDiff::PushFront { value } => items.insert(0, value),
        VectorDiff::PopBack => {
            items.pop();
        }
        VectorDiff::PopFront => {
            if !items.is_empty() {
                items.remove(0);
            }
        }
        VectorDiff::Insert { index, value } => items.insert(index, value),
        VectorDiff::Remove { index } => {
            items.remove(index);
        }
        VectorDiff::Truncate { length } => items.truncate(length),
        VectorDiff::Reset { values } => *items = values,
        VectorDiff::Append { mut values } => items.append(&mut values),
        VectorDiff::Clear => items.clear(),
    }

    Ok(())
}
