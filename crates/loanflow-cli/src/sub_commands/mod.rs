pub mod commit;
pub mod discard;
pub mod flows;
pub mod run;
pub mod start;
pub mod status;
