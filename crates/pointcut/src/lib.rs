//! Pointcut combinator engine and compiled contributor model.
//!
//! A pointcut is a composable predicate over a typed subject that optionally
//! produces captured sub-results. Contributor scripts compile down to an
//! ordered list of `(pointcut, action)` rules plus a static-info side table;
//! this crate defines both halves and the host-facing [`Subject`] boundary.
//! It knows nothing about caching, compilation, or file discovery.

mod combinators;
mod contributor;
mod host;
mod subject;

pub use combinators::{And, Bind, MatchContext, Not, Or, Pointcut, PointcutRef, QueryFacts, and, bind, not, or};
pub use contributor::{Action, CallbackId, CompiledContributor, CompositionError, MemberKind, MemberSpec, Rule};
pub use host::{CurrentType, EnclosingContext, EnclosingType, NamePointcut, SubtypePointcut};
pub use subject::{MatchList, Subject, SubjectId, SubjectKind, SubjectRef, intersect, union};
