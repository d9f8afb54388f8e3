pub mod api_workflows;
