pub mod ports;
pub mod timing;

pub mod import_new_products_use_case;
pub mod product_use_cases;
pub mod scheduled_import_use_case;
