/// Result table names. These are the lookup keys used by readers of a published
/// generation, so they must stay stable across releases.
pub const COMBINED_DATA: &str = "combined_data";
pub const DAILY_SALES: &str = "daily_sales";
pub const REGIONAL_DAILY_SALES: &str = "regional_daily_sales";
pub const MALL_PROFITABILITY: &str = "mall_profitability";
pub const CATEGORY_PROFITABILITY: &str = "category_profitability";
pub const SEASONAL_TRENDS: &str = "seasonal_trends";
pub const WEEKLY_PATTERNS: &str = "weekly_patterns";
pub const MONTHLY_TRENDS: &str = "monthly_trends";
pub const QUARTERLY_TRENDS: &str = "quarterly_trends";
pub const PAYMENT_ANALYSIS: &str = "payment_analysis";
pub const PAYMENT_BY_REGION: &str = "payment_by_region";
pub const PAYMENT_BY_CATEGORY: &str = "payment_by_category";
pub const PAYMENT_TRENDS: &str = "payment_trends";

/// Every table a complete generation carries, in export order.
pub const ALL_TABLES: &[&str] = &[
    COMBINED_DATA,
    DAILY_SALES,
    REGIONAL_DAILY_SALES,
    MALL_PROFITABILITY,
    CATEGORY_PROFITABILITY,
    SEASONAL_TRENDS,
    WEEKLY_PATTERNS,
    MONTHLY_TRENDS,
    QUARTERLY_TRENDS,
    PAYMENT_ANALYSIS,
    PAYMENT_BY_REGION,
    PAYMENT_BY_CATEGORY,
    PAYMENT_TRENDS,
];

// Files inside a generation directory
pub const TABLES_DIR: &str = "tables";
pub const SUMMARY_JSON: &str = "summary.json";
pub const SUMMARY_REPORT: &str = "summary_report.txt";
pub const EXECUTION_LOG: &str = "execution_log.json";
pub const VIOLATIONS_CSV: &str = "violations.csv";
pub const MANIFEST_JSON: &str = "manifest.json";

// Layout of the output root
pub const GENERATIONS_DIR: &str = "generations";
pub const STAGING_DIR: &str = ".staging";
pub const FAILED_DIR: &str = "failed";
pub const CURRENT_POINTER: &str = "CURRENT";

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const DEFAULT_DATE_FORMATS: &[&str] = &["%d-%m-%Y", "%Y-%m-%d", "%d/%m/%Y"];

/// Ages outside this range are flagged but the row is kept.
pub const MAX_PLAUSIBLE_AGE: i64 = 120;
