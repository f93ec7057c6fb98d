//! 认知层：Planner、中断控制、主循环与过程事件

pub mod events;
pub mod interrupt;
pub mod loop_;
pub mod planner;

pub use events::{chunk_response, AgentEvent, EventFrame, EventSink, Pacing};
pub use loop_::{drive, run_loop, LoopContext, LoopExit};
pub use planner::{classify_completion, next_transition, Planner, StepOutcome, Transition, DEFAULT_SYSTEM_PROMPT};
