pub mod builtin;
mod definition;
mod executor;
mod instance;
mod log;
mod machine;
mod validate;

pub use definition::{GatewayCondition, Lane, ProcessDefinition, SlaThresholds, Step, StepKind};
pub use executor::{Clock, StepExecutor, SystemClock};
pub use instance::{EntityKind, EntityLink, InstanceStatus, ProcessInstance};
pub use log::{ExitOutcome, StepEvent, StepEventKind};
pub use machine::{Actor, ActorRole, Advance, StepMachine, TransitionContext};
pub use validate::{ValidationError, step_graph, validate_definition};
