//! Workbook → normalized table, through real XLSX files.

use std::path::Path;

use fuelgrid_io::{acquire, load_grid, normalize, AcquireOptions, ContentKind, NormalizeError};
use rust_xlsxwriter::{Format, Workbook};

fn write_price_workbook(path: &Path) {
    let mut workbook = Workbook::new();
    let tax_id_mask = Format::new().set_num_format(r"00\.000\.000\/0000\-00");
    let date = Format::new().set_num_format("dd/mm/yyyy");
    let price = Format::new().set_num_format("#,##0.000");

    let sheet = workbook.add_worksheet();
    sheet.set_name("Postos").unwrap();
    sheet.write_string(0, 0, "AGÊNCIA NACIONAL DO PETRÓLEO, GÁS NATURAL E BIOCOMBUSTÍVEIS").unwrap();
    sheet.write_string(1, 0, "LEVANTAMENTO DE PREÇOS DE COMBUSTÍVEIS").unwrap();

    let headers = ["CNPJ", "RAZÃO", "MUNICÍPIO", "ESTADO", "PRODUTO", "PREÇO DE REVENDA", "DATA DA COLETA"];
    for (col, h) in headers.iter().enumerate() {
        sheet.write_string(3, col as u16, *h).unwrap();
    }

    // Row 5: tax id as a masked number with leading zero lost.
    sheet.write_number_with_format(4, 0, 1234567000100.0, &tax_id_mask).unwrap();
    sheet.write_string(4, 1, "AUTO POSTO UM LTDA").unwrap();
    sheet.write_string(4, 2, "CURITIBA").unwrap();
    sheet.write_string(4, 3, "PR").unwrap();
    sheet.write_string(4, 4, "GASOLINA COMUM").unwrap();
    sheet.write_number_with_format(4, 5, 5.59, &price).unwrap();
    sheet.write_number_with_format(4, 6, 45306.0, &date).unwrap();
    // Column I has no header, so this note must not reach the table.
    sheet.write_string(4, 8, "note beyond the table").unwrap();

    // Row 6: entirely blank.

    // Row 7: tax id as a bare 14-digit number.
    sheet.write_number(6, 0, 98765432000110.0).unwrap();
    sheet.write_string(6, 1, "POSTO DOIS").unwrap();
    sheet.write_string(6, 2, "LONDRINA").unwrap();
    sheet.write_string(6, 3, "PR").unwrap();
    sheet.write_string(6, 4, "ETANOL").unwrap();
    sheet.write_string(6, 5, "R$ 4,19").unwrap();
    sheet.write_string(6, 6, "2024-01-16").unwrap();

    let other = workbook.add_worksheet();
    other.set_name("Resumo").unwrap();
    other.write_string(0, 0, "CNPJ").unwrap();
    other.write_string(1, 0, "should never be read").unwrap();

    workbook.save(path).unwrap();
}

#[test]
fn test_workbook_normalizes_first_sheet() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("precos.xlsx");
    write_price_workbook(&path);

    let options = AcquireOptions {
        scratch_dir: dir.path().to_path_buf(),
        ..AcquireOptions::default()
    };
    let acquired = acquire(path.to_str().unwrap(), &options).unwrap();
    assert_eq!(acquired.kind, ContentKind::Xlsx);

    let grid = load_grid(&acquired).unwrap();
    let table = normalize(&grid, "cnpj").unwrap();

    assert_eq!(
        table.headers,
        vec!["CNPJ", "RAZÃO", "MUNICÍPIO", "ESTADO", "PRODUTO", "PREÇO DE REVENDA", "DATA DA COLETA"]
    );
    assert_eq!(table.rows.len(), 2, "blank row and preamble are dropped");

    assert_eq!(
        table.rows[0],
        vec![
            "01.234.567/0001-00",
            "AUTO POSTO UM LTDA",
            "CURITIBA",
            "PR",
            "GASOLINA COMUM",
            "5.59",
            "15/01/2024",
        ]
    );
    assert_eq!(table.rows[1][0], "98.765.432/0001-10");
    assert_eq!(table.rows[1][5], "R$ 4,19");
    assert_eq!(table.rows[1][6], "2024-01-16");
}

#[test]
fn test_workbook_without_anchor_is_malformed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sem_cabecalho.xlsx");

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "RAZÃO").unwrap();
    sheet.write_string(1, 0, "POSTO").unwrap();
    workbook.save(&path).unwrap();

    let grid = fuelgrid_io::load_grid_from(&path, ContentKind::Xlsx).unwrap();
    let err = normalize(&grid, "CNPJ").unwrap_err();
    assert!(matches!(err, NormalizeError::AnchorNotFound(_)));
}

#[test]
fn test_intermediate_csv_from_workbook() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("precos.xlsx");
    write_price_workbook(&path);

    let grid = fuelgrid_io::load_grid_from(&path, ContentKind::Xlsx).unwrap();
    let table = normalize(&grid, "CNPJ").unwrap();
    let scratch = fuelgrid_io::csv::write_intermediate(&table, dir.path()).unwrap();

    let text = std::fs::read_to_string(scratch.path()).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("CNPJ,RAZÃO,MUNICÍPIO,ESTADO,PRODUTO,PREÇO DE REVENDA,DATA DA COLETA")
    );
    assert_eq!(
        lines.nth(1),
        Some("98.765.432/0001-10,POSTO DOIS,LONDRINA,PR,ETANOL,\"R$ 4,19\",2024-01-16")
    );

    let back = fuelgrid_io::csv::read_table(scratch.path()).unwrap();
    assert_eq!(back, table);
}

#[test]
fn test_out_of_range_date_cell_does_not_abort_the_sheet() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data_invalida.xlsx");
    let date = Format::new().set_num_format("dd/mm/yyyy");

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "CNPJ").unwrap();
    sheet.write_string(0, 1, "DATA DA COLETA").unwrap();
    sheet.write_string(1, 0, "12.345.678/0001-90").unwrap();
    sheet.write_number_with_format(1, 1, 1e20, &date).unwrap();
    sheet.write_string(2, 0, "98.765.432/0001-10").unwrap();
    sheet.write_number_with_format(2, 1, 45306.0, &date).unwrap();
    workbook.save(&path).unwrap();

    let grid = fuelgrid_io::load_grid_from(&path, ContentKind::Xlsx).unwrap();
    let table = normalize(&grid, "CNPJ").unwrap();

    assert_eq!(table.rows.len(), 2);
    // The bad date survives as a raw number; validation rejects that row only.
    assert_eq!(table.rows[0][1], "100000000000000000000");
    assert_eq!(table.rows[1][1], "15/01/2024");
}
