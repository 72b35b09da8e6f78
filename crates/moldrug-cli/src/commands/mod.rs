pub mod desirability;
pub mod export;
pub mod run;
