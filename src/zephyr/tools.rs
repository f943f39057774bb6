//! Test management tools

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::ZephyrAdapter;
use crate::Result;
use crate::pagination::PageRequest;
use crate::tools::{Elicitor, Tool, ToolRegistry, to_json};

/// Register every test management tool
pub fn register(registry: &mut ToolRegistry, adapter: &Arc<ZephyrAdapter>) -> Result<()> {
    registry.register(ListTestCases(Arc::clone(adapter)))?;
    registry.register(GetTestCase(Arc::clone(adapter)))?;
    registry.register(ListTestCycles(Arc::clone(adapter)))?;
    Ok(())
}

/// Arguments of `zephyr_get_test_case`
#[derive(Debug, Deserialize)]
pub struct TestCaseArgs {
    /// Test case key, e.g. `PROJ-T123`
    pub test_case_key: String,
}

struct ListTestCases(Arc<ZephyrAdapter>);

#[async_trait]
impl Tool for ListTestCases {
    type Args = PageRequest;

    fn name(&self) -> &'static str {
        "zephyr_list_test_cases"
    }

    fn description(&self) -> &'static str {
        "List test cases (filters: projectKey, folderId)"
    }

    async fn call(&self, args: PageRequest, _elicitor: &dyn Elicitor) -> Result<Value> {
        to_json(&self.0.list_test_cases(args).await?)
    }
}

struct GetTestCase(Arc<ZephyrAdapter>);

#[async_trait]
impl Tool for GetTestCase {
    type Args = TestCaseArgs;

    fn name(&self) -> &'static str {
        "zephyr_get_test_case"
    }

    fn description(&self) -> &'static str {
        "Get one test case by key"
    }

    async fn call(&self, args: TestCaseArgs, _elicitor: &dyn Elicitor) -> Result<Value> {
        self.0.get_test_case(&args.test_case_key).await
    }
}

struct ListTestCycles(Arc<ZephyrAdapter>);

#[async_trait]
impl Tool for ListTestCycles {
    type Args = PageRequest;

    fn name(&self) -> &'static str {
        "zephyr_list_test_cycles"
    }

    fn description(&self) -> &'static str {
        "List test cycles (filters: projectKey, folderId, jiraProjectVersionId)"
    }

    async fn call(&self, args: PageRequest, _elicitor: &dyn Elicitor) -> Result<Value> {
        to_json(&self.0.list_test_cycles(args).await?)
    }
}
