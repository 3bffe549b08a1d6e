//! Diff operations on an ordered collection.

use crate::error::Result;
use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// One change to an ordered sequence, as delivered by the upstream service.
///
/// The wire shape is externally tagged, matching what the upstream emits:
/// `{"Set":{"index":3,"value":..}}`, `"PopBack"`, `{"Reset":{"values":[..]}}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum VectorDiff<T> {
    /// Replace the element at `index`.
    Set { index: usize, value: T },
    PushBack { value: T },
    PushFront { value: T },
    PopBack,
    PopFront,
    /// Insert at `index` in `[0, len]`.
    Insert { index: usize, value: T },
    Remove { index: usize },
    /// Keep only the first `length` elements.
    Truncate { length: usize },
    /// Replace the entire sequence.
    Reset { values: Vec<T> },
    Append { values: Vec<T> },
    Clear,
}

impl<T> VectorDiff<T> {
    /// Short operation name, used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            VectorDiff::Set { .. } => "Set",
            VectorDiff::PushBack { .. } => "PushBack",
            VectorDiff::PushFront { .. } => "PushFront",
            VectorDiff::PopBack => "PopBack",
            VectorDiff::PopFront => "PopFront",
            VectorDiff::Insert { .. } => "Insert",
            VectorDiff::Remove { .. } => "Remove",
            VectorDiff::Truncate { .. } => "Truncate",
            VectorDiff::Reset { .. } => "Reset",
            VectorDiff::Append { .. } => "Append",
            VectorDiff::Clear => "Clear",
        }
    }

    /// Length of a sequence of `len` elements after this diff is applied.
    ///
    /// Only meaningful for diffs that apply cleanly; index checks are the
    /// job of [`apply_diff`](super::apply_diff).
    pub fn resulting_len(&self, len: usize) -> usize {
        match self {
            VectorDiff::Set { .. } => len,
            VectorDiff::PushBack { .. }
            | VectorDiff::PushFront { .. }
            | VectorDiff::Insert { .. } => len + 1,
            VectorDiff::PopBack | VectorDiff::PopFront => len.saturating_sub(1),
            VectorDiff::Remove { .. } => len.saturating_sub(1),
            VectorDiff::Truncate { length } => len.min(*length),
            VectorDiff::Reset { values } => values.len(),
            VectorDiff::Append { values } => len + values.len(),
            VectorDiff::Clear => 0,
        }
    }

    /// Convert every carried value, failing on the first error.
    pub fn try_map<U, F>(self, mut f: F) -> Result<VectorDiff<U>>
    where
        F: FnMut(T) -> Result<U>,
    {
        Ok(match self {
            VectorDiff::Set { index, value } => VectorDiff::Set {
                index,
                value: f(value)?,
            },
            VectorDiff::PushBack { value } => VectorDiff::PushBack { value: f(value)? },
            VectorDiff::PushFront { value } => VectorDiff::PushFront { value: f(value)? },
            VectorDiff::PopBack => VectorDiff::PopBack,
            VectorDiff::PopFront => VectorDiff::PopFront,
            VectorDiff::Insert { index, value } => VectorDiff::Insert {
                index,
                value: f(value)?,
            },
            VectorDiff::Remove { index } => VectorDiff::Remove { index },
            VectorDiff::Truncate { length } => VectorDiff::Truncate { length },
            VectorDiff::Reset { values } => VectorDiff::Reset {
                values: values.into_iter().map(f).collect::<Result<_>>()?,
            },
            VectorDiff::Append { values } => VectorDiff::Append {
                values: values.into_iter().map(f).collect::<Result<_>>()?,
            },
            VectorDiff::Clear => VectorDiff::Clear,
        })
    }

    /// Asynchronous [`try_map`](Self::try_map). Values of a `Reset` or
    /// `Append` are converted concurrently; their order is preserved.
    pub async fn try_map_async<U, F, Fut>(self, f: &F) -> Result<VectorDiff<U>>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<U>>,
    {
        Ok(match self {
            VectorDiff::Set { index, value } => VectorDiff::Set {
                index,
                value: f(value).await?,
            },
            VectorDiff::PushBack { value } => VectorDiff::PushBack {
                value: f(value).await?,
            },
            VectorDiff::PushFront { value } => VectorDiff::PushFront {
                value: f(value).await?,
            },
            VectorDiff::PopBack => VectorDiff::PopBack,
            VectorDiff::PopFront => VectorDiff::PopFront,
            VectorDiff::Insert { index, value } => VectorDiff::Insert {
                index,
                value: f(value).await?,
            },
            VectorDiff::Remove { index } => VectorDiff::Remove { index },
            VectorDiff::Truncate { length } => VectorDiff::Truncate { length },
            VectorDiff::Reset { values } => VectorDiff::Reset {
                values: try_join_all(values.into_iter().map(f)).await?,
            },
            VectorDiff::Append { values } => VectorDiff::Append {
                values: try_join_all(values.into_iter().map(f)).await?,
            },
            VectorDiff::Clear => VectorDiff::Clear,
        })
    }
}

impl VectorDiff<serde_json::Value> {
    /// Decode one raw diff from the upstream's JSON representation.
    pub fn from_json(raw: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde_json::json;

    #[test]
    fn test_decode_tagged_variants() {
        let set = VectorDiff::from_json(json!({"Set": {"index": 2, "value": "x"}})).unwrap();
        assert_eq!(
            set,
            VectorDiff::Set {
                index: 2,
                value: json!("x")
            }
        );

        let pop = VectorDiff::from_json(json!("PopBack")).unwrap();
        assert_eq!(pop, VectorDiff::PopBack);

        let truncate = VectorDiff::from_json(json!({"Truncate": {"length": 4}})).unwrap();
        assert_eq!(truncate, VectorDiff::Truncate { length: 4 });
    }

    #[test]
    fn test_decode_unknown_tag_is_error() {
        let result = VectorDiff::from_json(json!({"Shuffle": {"seed": 1}}));
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn test_resulting_len() {
        assert_eq!(VectorDiff::<u8>::PopFront.resulting_len(0), 0);
        assert_eq!(VectorDiff::<u8>::Truncate { length: 10 }.resulting_len(3), 3);
        assert_eq!(
            VectorDiff::Append {
                values: vec![1u8, 2]
            }
            .resulting_len(3),
            5
        );
        assert_eq!(VectorDiff::<u8>::Clear.resulting_len(7), 0);
        assert_eq!(VectorDiff::<u8>::Remove { index: 0 }.resulting_len(0), 0);
    }

    #[test]
    fn test_try_map_stops_on_error() {
        let diff = VectorDiff::Reset {
            values: vec![1, 2, 3],
        };
        let result = diff.try_map(|v| {
            if v == 2 {
                Err(Error::Decode("two".into()))
            } else {
                Ok(v * 10)
            }
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_try_map_async_preserves_order() {
        let diff = VectorDiff::Append {
            values: vec![3u64, 1, 2],
        };
        let mapped = diff
            .try_map_async(&|v: u64| async move {
                tokio::time::sleep(std::time::Duration::from_millis(v)).await;
                Ok::<_, Error>(v.to_string())
            })
            .await
            .unwrap();
        assert_eq!(
            mapped,
            VectorDiff::Append {
                values: vec!["3".to_string(), "1".to_string(), "2".to_string()]
            }
        );
    }
}
