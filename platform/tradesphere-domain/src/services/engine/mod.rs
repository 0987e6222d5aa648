pub mod clock;
pub mod simulation;
