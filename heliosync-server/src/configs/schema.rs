use crate::models::{
    DeviceTable, EnergyDataTable, EnergyModeTable, ModeHistoryTable, ScheduleTable, Table,
    UserDeviceTable, UserTable,
};

pub struct SchemaManager {
    tables: Vec<Box<dyn Table>>,
}

impl SchemaManager {
    pub fn new(mut tables: Vec<Box<dyn Table>>) -> Self {
        Self::sort_tables(&mut tables);
        Self { tables }
    }

    fn sort_tables(tables: &mut Vec<Box<dyn Table>>) {
        let mut to_sort = std::mem::take(tables);
        let mut deps_list: Vec<_> = to_sort.iter().map(|t| t.dependencies()).collect();
        let mut sorted = Vec::with_capacity(to_sort.len());

        while !to_sort.is_empty() {
            let independent_indices: Vec<usize> = deps_list
                .iter()
                .enumerate()
                .filter(|(_, deps)| deps.is_empty())
                .map(|(i, _)| i)
                .collect();

            assert!(
                !independent_indices.is_empty(),
                "Circular dependency detected or unresolved dependencies exist."
            );

            for &index in independent_indices.iter().rev() {
                let table = to_sort.swap_remove(index);
                let _ = deps_list.swap_remove(index);
                sorted.push(table);
            }

            for deps in deps_list.iter_mut() {
                deps.retain(|dep_name| {
                    !sorted
                        .iter()
                        .any(|resolved_table| resolved_table.name() == *dep_name)
                });
            }
        }

        *tables = sorted;
    }

    pub fn create_schema(&self) -> Vec<String> {
        self.tables.iter().map(|table| table.create()).collect()
    }

    pub fn dispose_schema(&self) -> Vec<String> {
        self.tables.iter().rev().map(|table| table.dispose()).collect()
    }
}

impl Default for SchemaManager {
    fn default() -> Self {
        SchemaManager::new(vec![
            Box::new(UserTable),
            Box::new(DeviceTable),
            Box::new(UserDeviceTable),
            Box::new(ScheduleTable),
            Box::new(EnergyModeTable),
            Box::new(ModeHistoryTable),
            Box::new(EnergyDataTable),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct MockUserTable;
    impl Table for MockUserTable {
        fn name(&self) -> &'static str {
            "users"
        }
        fn create(&self) -> String {
            "CREATE TABLE users;".to_string()
        }
        fn dispose(&self) -> String {
            "DROP TABLE users;".to_string()
        }
        fn dependencies(&self) -> Vec<&'static str> {
            vec![]
        }
    }

    #[derive(Clone)]
    struct MockDeviceTable;
    impl Table for MockDeviceTable {
        fn name(&self) -> &'static str {
            "devices"
        }
        fn create(&self) -> String {
            "CREATE TABLE devices;".to_string()
        }
        fn dispose(&self) -> String {
            "DROP TABLE devices;".to_string()
        }
        fn dependencies(&self) -> Vec<&'static str> {
            vec!["users"]
        }
    }

    #[test]
    fn test_tables_sorted_by_dependency() {
        let manager =
            SchemaManager::new(vec![Box::new(MockDeviceTable), Box::new(MockUserTable)]);

        let statements = manager.create_schema();
        assert_eq!(statements[0], "CREATE TABLE users;");
        assert_eq!(statements[1], "CREATE TABLE devices;");
    }

    #[test]
    fn test_dispose_reverses_creation_order() {
        let manager =
            SchemaManager::new(vec![Box::new(MockDeviceTable), Box::new(MockUserTable)]);

        let statements = manager.dispose_schema();
        assert_eq!(statements[0], "DROP TABLE devices;");
        assert_eq!(statements[1], "DROP TABLE users;");
    }
}
