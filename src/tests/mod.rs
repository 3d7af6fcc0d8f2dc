
mod api_tests;
mod monitor_tests;
