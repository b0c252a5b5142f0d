//! Pre-binding handler arguments.
//!
//! [`bind_handler`] wraps a handler with a tuple of slots, one per argument
//! the handler takes. A slot is either a literal, forwarded as stored, or a
//! placeholder `_1`..`_3` naming a position in the argument list the
//! wrapper is later invoked with.
//!
//! ```
//! use sqlbridge_core::bind::{_2, bind_handler, lit};
//! use sqlbridge_core::Handler;
//!
//! let handler = bind_handler(
//!     |label: &str, n: u32| assert_eq!((label, n), ("rows", 3)),
//!     (lit("rows"), _2),
//! );
//! handler.invoke(("ignored", 3_u32));
//! ```

use crate::allocator::AnyAllocator;
use crate::completion::Handler;
use crate::executor::AnyExecutor;

/// Stands for the `N`th late-bound argument (1-based).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Placeholder<const N: usize>;

pub const _1: Placeholder<1> = Placeholder;
pub const _2: Placeholder<2> = Placeholder;
pub const _3: Placeholder<3> = Placeholder;

/// A value forwarded unchanged at invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lit<T>(pub T);

pub fn lit<T>(value: T) -> Lit<T> {
    Lit(value)
}

/// One bound slot. `Late` is the invocation's argument list, each element
/// wrapped in `Option` so placeholders can take it.
pub trait Slot<Late> {
    type Output;

    fn resolve(self, late: &mut Late) -> Self::Output;
}

impl<T, Late> Slot<Late> for Lit<T> {
    type Output = T;

    fn resolve(self, _late: &mut Late) -> T {
        self.0
    }
}

macro_rules! placeholder_slot {
    ($n:literal => $idx:tt : $out:ident ; $($t:ident),+) => {
        impl<$($t),+> Slot<($(Option<$t>,)+)> for Placeholder<$n> {
            type Output = $out;

            fn resolve(self, late: &mut ($(Option<$t>,)+)) -> $out {
                late.$idx.take().unwrap_or_else(|| {
                    panic!(concat!("placeholder _", stringify!($n), " substituted more than once"))
                })
            }
        }
    };
}

placeholder_slot!(1 => 0: A; A);
placeholder_slot!(1 => 0: A; A, B);
placeholder_slot!(2 => 1: B; A, B);
placeholder_slot!(1 => 0: A; A, B, C);
placeholder_slot!(2 => 1: B; A, B, C);
placeholder_slot!(3 => 2: C; A, B, C);

/// Which late argument a slot takes, if any.
pub trait SlotPosition {
    /// The 1-based placeholder position, or 0 for a literal.
    const POSITION: usize;
}

impl<T> SlotPosition for Lit<T> {
    const POSITION: usize = 0;
}

impl<const N: usize> SlotPosition for Placeholder<N> {
    const POSITION: usize = N;
}

/// A tuple of slots accepted by [`bind_handler`].
pub trait SlotList {
    /// The first placeholder position that appears more than once.
    fn repeated_placeholder() -> Option<usize>;
}

fn first_repeat(positions: &[usize]) -> Option<usize> {
    positions
        .iter()
        .enumerate()
        .find(|&(i, &p)| p != 0 && positions[..i].contains(&p))
        .map(|(_, &p)| p)
}

impl<S0: SlotPosition> SlotList for (S0,) {
    fn repeated_placeholder() -> Option<usize> {
        None
    }
}

impl<S0: SlotPosition, S1: SlotPosition> SlotList for (S0, S1) {
    fn repeated_placeholder() -> Option<usize> {
        first_repeat(&[S0::POSITION, S1::POSITION])
    }
}

impl<S0: SlotPosition, S1: SlotPosition, S2: SlotPosition> SlotList for (S0, S1, S2) {
    fn repeated_placeholder() -> Option<usize> {
        first_repeat(&[S0::POSITION, S1::POSITION, S2::POSITION])
    }
}

/// A handler invoked through a tuple of [`Slot`]s.
#[derive(Debug, Clone)]
pub struct BoundHandler<H, S> {
    handler: H,
    slots: S,
}

/// Wrap `handler` so that each of its arguments comes from the matching
/// slot in `slots`.
///
/// # Panics
///
/// Panics if the same placeholder appears in `slots` more than once, since
/// each late argument can be handed over only once.
pub fn bind_handler<H, S: SlotList>(handler: H, slots: S) -> BoundHandler<H, S> {
    if let Some(position) = S::repeated_placeholder() {
        panic!("placeholder _{position} bound more than once");
    }
    BoundHandler { handler, slots }
}

impl<H, S> BoundHandler<H, S> {
    pub fn into_inner(self) -> H {
        self.handler
    }
}

macro_rules! bound_handler {
    ([$($arg:ident $val:ident),+] late $late:ty ; [$($slot:ident . $sidx:tt),+]) => {
        impl<H, $($arg,)+ $($slot,)+> Handler<($($arg,)+)> for BoundHandler<H, ($($slot,)+)>
        where
            $($arg: Send + 'static,)+
            $($slot: Slot<$late> + Send + 'static,)+
            H: Handler<($(<$slot as Slot<$late>>::Output,)+)>,
        {
            fn invoke(self, ($($val,)+): ($($arg,)+)) {
                let BoundHandler { handler, slots } = self;
                let mut late: $late = ($(Some($val),)+);
                let resolved = ($(slots.$sidx.resolve(&mut late),)+);
                handler.invoke(resolved);
            }

            fn associated_executor(&self) -> Option<AnyExecutor> {
                self.handler.associated_executor()
            }

            fn associated_allocator(&self) -> Option<AnyAllocator> {
                self.handler.associated_allocator()
            }
        }
    };
}

bound_handler!([A a] late (Option<A>,); [S0 . 0]);
bound_handler!([A a] late (Option<A>,); [S0 . 0, S1 . 1]);
bound_handler!([A a] late (Option<A>,); [S0 . 0, S1 . 1, S2 . 2]);
bound_handler!([A a, B b] late (Option<A>, Option<B>); [S0 . 0]);
bound_handler!([A a, B b] late (Option<A>, Option<B>); [S0 . 0, S1 . 1]);
bound_handler!([A a, B b] late (Option<A>, Option<B>); [S0 . 0, S1 . 1, S2 . 2]);
bound_handler!([A a, B b, C c] late (Option<A>, Option<B>, Option<C>); [S0 . 0]);
bound_handler!([A a, B b, C c] late (Option<A>, Option<B>, Option<C>); [S0 . 0, S1 . 1]);
bound_handler!([A a, B b, C c] late (Option<A>, Option<B>, Option<C>); [S0 . 0, S1 . 1, S2 . 2]);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCode, FrameworkErrc};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_placeholders_substitute_positionally() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let out = Arc::clone(&seen);
        let handler = bind_handler(
            move |a: i32, b: i32| out.lock().unwrap().push((a, b)),
            (_2, _1),
        );
        handler.invoke((1, 2));
        assert_eq!(*seen.lock().unwrap(), vec![(2, 1)]);
    }

    #[test]
    fn test_literal_slots_are_forwarded() {
        let seen = Arc::new(Mutex::new(None));
        let out = Arc::clone(&seen);
        let handler = bind_handler(
            move |tag: &'static str, code: ErrorCode| *out.lock().unwrap() = Some((tag, code)),
            (lit("prepare"), _2),
        );
        handler.invoke(("statement", ErrorCode::from(FrameworkErrc::Other)));
        let (tag, code) = seen.lock().unwrap().unwrap();
        assert_eq!(tag, "prepare");
        assert_eq!(code, FrameworkErrc::Other);
    }

    #[test]
    fn test_wider_handler_than_invocation() {
        let seen = Arc::new(Mutex::new(None));
        let out = Arc::clone(&seen);
        let handler = bind_handler(
            move |a: u8, b: &'static str, c: u8| *out.lock().unwrap() = Some((a, b, c)),
            (_1, lit("mid"), lit(9_u8)),
        );
        handler.invoke((4_u8,));
        assert_eq!(*seen.lock().unwrap(), Some((4, "mid", 9)));
    }

    #[test]
    #[should_panic(expected = "placeholder _1 bound more than once")]
    fn test_repeated_placeholder_rejected_when_bound() {
        let _handler = bind_handler(|_a: String, _b: String| {}, (_1, _1));
    }

    #[test]
    fn test_repeated_placeholder_detection() {
        assert_eq!(<(Placeholder<2>, Lit<u8>, Placeholder<2>)>::repeated_placeholder(), Some(2));
        assert_eq!(<(Lit<u8>, Lit<u8>)>::repeated_placeholder(), None);
        assert_eq!(<(Placeholder<1>, Placeholder<2>, Placeholder<3>)>::repeated_placeholder(), None);
    }

    #[test]
    fn test_forwards_associated_executor() {
        let ctx = crate::context::IoContext::new();
        let inner = crate::completion::bind_executor(ctx.executor(), |_code: ErrorCode| {});
        let bound = bind_handler(inner, (_2,));
        let executor = Handler::<(u8, ErrorCode)>::associated_executor(&bound);
        assert_eq!(executor, Some(ctx.executor()));
    }
}
