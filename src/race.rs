//! Race-then-cleanup
//!
//! Some resources have several independent ways to finish (a process exits,
//! its output hits EOF, the caller gives up) but must be torn down exactly
//! once whichever happens first. [`race_then_cleanup`] waits for the first
//! source, runs the teardown, then waits for the owned sources that lost so
//! nothing is left running when it returns.

use std::future::Future;

/// Which source finished first
#[derive(Debug, PartialEq, Eq)]
pub enum Winner<A, B> {
    First(A),
    Second(B),
    Cancelled,
}

/// Race `first`, `second` and `cancel`, tear down, then drain.
///
/// `teardown` runs once, right after the winner is known. It must make both
/// `first` and `second` finish; they are awaited to completion afterwards.
/// `cancel` is external and is never drained.
pub async fn race_then_cleanup<A, B, FA, FB, C, T>(
    first: FA,
    second: FB,
    cancel: C,
    teardown: T,
) -> Winner<A, B>
where
    FA: Future<Output = A>,
    FB: Future<Output = B>,
    C: Future<Output = ()>,
    T: FnOnce(),
{
    tokio::pin!(first, second, cancel);

    let winner = tokio::select! {
        a = &mut first => Winner::First(a),
        b = &mut second => Winner::Second(b),
        () = &mut cancel => Winner::Cancelled,
    };

    teardown();

    match &winner {
        Winner::First(_) => {
            second.await;
        }
        Winner::Second(_) => {
            first.await;
        }
        Winner::Cancelled => {
            tokio::join!(first, second);
        }
    }

    winner
}
