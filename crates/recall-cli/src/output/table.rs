use comfy_table::Table;

pub fn new_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_header(header.to_vec());
    table
}

pub fn print_table(table: Table) {
    println!("{table}");
}
