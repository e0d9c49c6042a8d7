mod artifact_test;
mod generation_test;
mod parsing_test;
