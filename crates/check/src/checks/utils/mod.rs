mod reference_checker;
pub use reference_checker::ReferenceChecker;
