pub mod types;
pub mod yaml;

pub use types::{ApiTestCase, Expectations, RequestSpec, RetrySpec, TestFile};
pub use yaml::{parse_test_file, parse_yaml_content};
