pub mod budgets;
pub mod categories;
pub mod flow_logs;
pub mod users;
pub mod warehouse_members;
pub mod warehouses;
