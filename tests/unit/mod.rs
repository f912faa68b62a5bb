mod reference_tests;
mod suite_tests;
