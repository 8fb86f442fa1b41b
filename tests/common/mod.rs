use std::fs;
use std::path::Path;

use retail_analytics::config::Config;

pub const TRANSACTION_HEADER: &str =
    "invoice_no,customer_id,gender,age,category,quantity,price,payment_method,invoice_date,shopping_mall,Discount\n";

pub const REGION_HEADER: &str = "shopping_mall,Region\n";

/// Write the two input files under `dir` and return a config pointing at them.
pub fn setup(dir: &Path, transactions: &str, regions: &str) -> Config {
    let transactions_path = dir.join("customer_shopping_data.csv");
    let regions_path = dir.join("Region_detail_table.csv");
    fs::write(&transactions_path, format!("{TRANSACTION_HEADER}{transactions}")).unwrap();
    fs::write(&regions_path, format!("{REGION_HEADER}{regions}")).unwrap();

    let mut config = Config::default();
    config.input.transactions = transactions_path;
    config.input.regions = regions_path;
    config.output.root = dir.join("results");
    config
}

pub const SAMPLE_TRANSACTIONS: &str = "\
I100,C1,Female,28,Clothing,2,50,Cash,15-01-2021,M1,10%
I101,C2,Male,35,Shoes,1,600.17,Credit Card,16-01-2021,M2,0%
I102,C3,Female,41,Books,5,15.15,Debit Card,05-03-2022,M1,5%
I103,C1,Female,28,Cosmetics,3,40.66,Cash,20-07-2021,M3,0.2
I104,C4,Male,19,Toys,4,35.84,credit_card,20-07-2021,M9,15%
I105,C5,Female,67,Clothing,1,300.08,Cash,03-11-2021,M2,0%
I106,C6,Male,50,Technology,1,1050,Credit Card,28-12-2021,M3,25%
I107,C2,Male,35,Souvenir,2,11.73,Debit Card,01-02-2022,M1,0%
";

pub const SAMPLE_REGIONS: &str = "\
M1,North
M2,South
M3,North
";
