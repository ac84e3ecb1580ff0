//! First-ready-wins race across many sources

use super::source::SourceIterator;
use crate::effect::Value;
use crate::error::{common, EffectError, Result};
use crate::runtime::{CancellationScope, Environment};
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::trace;

struct RaceOutcome {
    winner: Option<usize>,
    exhausted: Vec<usize>,
    error: Option<EffectError>,
}

/// Reads whichever child source becomes ready first
///
/// Every read checks all remaining children for readiness concurrently
/// under a child of the caller's token. The first check to report ready
/// wins; the race scope is then cancelled and the remaining checks dropped,
/// which is safe because checks never consume items. The winner's item is
/// dequeued afterwards, outside the race. Check order rotates between reads.
pub(crate) struct MergeIterator<A> {
    children: Vec<Box<dyn SourceIterator<A>>>,
    started_empty: bool,
    winner: Option<usize>,
    rotation: usize,
}

impl<A: Value> MergeIterator<A> {
    pub(crate) fn new(children: Vec<Box<dyn SourceIterator<A>>>) -> Self {
        Self {
            started_empty: children.is_empty(),
            children,
            winner: None,
            rotation: 0,
        }
    }

    async fn race(&mut self, env: &Environment, scope: &CancellationScope) -> RaceOutcome {
        let start = self.rotation % self.children.len();
        self.rotation = self.rotation.wrapping_add(1);

        let (head, tail) = self.children.split_at_mut(start);
        let ordered = tail
            .iter_mut()
            .enumerate()
            .map(|(offset, child)| (start + offset, child))
            .chain(head.iter_mut().enumerate());

        let mut checks: FuturesUnordered<_> = ordered
            .map(|(index, child)| async move { (index, child.ready_to_read(env, scope).await) })
            .collect();

        let mut exhausted = Vec::new();
        while let Some((index, ready)) = checks.next().await {
            match ready {
                Ok(true) => {
                    return RaceOutcome {
                        winner: Some(index),
                        exhausted,
                        error: None,
                    }
                }
                Ok(false) => exhausted.push(index),
                Err(error) => {
                    return RaceOutcome {
                        winner: None,
                        exhausted,
                        error: Some(error),
                    }
                }
            }
        }
        RaceOutcome {
            winner: None,
            exhausted,
            error: None,
        }
    }
}

#[async_trait]
impl<A: Value> SourceIterator<A> for MergeIterator<A> {
    async fn ready_to_read(&mut self, env: &Environment, token: &CancellationScope) -> Result<bool> {
        if self.started_empty {
            return Err(common::source_closed());
        }
        if self.winner.is_some() {
            return Ok(true);
        }

        while !self.children.is_empty() {
            let scope = token.child();
            let RaceOutcome {
                mut winner,
                mut exhausted,
                error,
            } = self.race(env, &scope).await;
            scope.cancel();

            exhausted.sort_unstable_by(|a, b| b.cmp(a));
            for index in exhausted {
                self.children.remove(index);
                if let Some(winner) = winner.as_mut() {
                    if index < *winner {
                        *winner -= 1;
                    }
                }
            }

            if let Some(error) = error {
                return Err(error);
            }
            if let Some(winner) = winner {
                trace!(winner, remaining = self.children.len(), "Merge race won");
                self.winner = Some(winner);
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn read(&mut self) -> Option<A> {
        let winner = self.winner.take()?;
        self.children.get_mut(winner)?.read()
    }
}
