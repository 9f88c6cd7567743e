//! Threaded drivers around the domain: the live decision loop and the
//! market scanner.

pub mod cancel;
pub mod live;
pub mod scanner;
