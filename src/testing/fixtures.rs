//! Temporary Python projects for tests.

use std::path::Path;
use tempfile::TempDir;

/// Create a temporary directory holding `files` (relative path, content).
///
/// # Panics
///
/// Panics if the directory or a file cannot be created.
#[must_use]
pub fn python_project(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp directory");
    write_files(dir.path(), files);
    dir
}

/// Write `files` under `root`, creating parent directories.
///
/// # Panics
///
/// Panics if a file cannot be written.
pub fn write_files(root: &Path, files: &[(&str, &str)]) {
    for (rel, content) in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        std::fs::write(&path, content).expect("Failed to write fixture file");
    }
}

/// A small inventory project: `order` depends on `inventory`, which depends
/// on `product`, plus an existing test for `product`.
#[must_use]
pub fn inventory_project() -> TempDir {
    python_project(&[
        (
            "product.py",
            "class Product:\n    def __init__(self, name, price):\n        self.name = name\n        self.price = price\n",
        ),
        (
            "inventory.py",
            "from product import Product\n\n\nclass Inventory:\n    def __init__(self):\n        self.items = {}\n\n    def add(self, product: Product, qty: int) -> None:\n        self.items[product.name] = (product, qty)\n",
        ),
        (
            "order.py",
            "import inventory\n\n\ndef total(inv: inventory.Inventory) -> float:\n    return sum(p.price * q for p, q in inv.items.values())\n",
        ),
        (
            "tests/test_product.py",
            "from product import Product\n\n\ndef test_product():\n    assert Product('a', 1).price == 1\n",
        ),
    ])
}
