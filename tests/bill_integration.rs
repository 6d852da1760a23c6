use chrono::NaiveDate;
use fno_billing::{
    AccountId, Bill, BillBatch, BillError, ChargeCategory, Exchange, FileRole, LineAddition,
    LineOverride, RateCard, RawExport, Segment,
};
use rust_decimal::Decimal;

fn fixture_path(name: &str) -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn fixture_raw(name: &str, role: FileRole) -> RawExport {
    let bytes = std::fs::read(fixture_path(name)).expect("read fixture");
    RawExport::from_bytes(&bytes, role).expect("decode fixture")
}

fn fixture_card() -> RateCard {
    RateCard::load(fixture_path("rate_card.toml")).expect("load fixture card")
}

fn trade_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 4, 1).unwrap()
}

fn fixture_bill() -> Bill {
    let day = fixture_raw("daywise.csv", FileRole::Daywise);
    let net = fixture_raw("netwise.csv", FileRole::Netwise);
    Bill::generate("PR001", trade_date(), &day, &net, &fixture_card()).expect("generate bill")
}

fn dec(s: &str) -> Decimal {
    s.parse().expect("decimal literal")
}

#[test]
fn bill_matches_hand_computed_charges() {
    let bill = fixture_bill();
    assert_eq!(bill.account, AccountId("PR001".to_string()));
    assert_eq!(bill.sections.len(), 1);

    let section = &bill.sections[0];
    assert_eq!(section.exchange, Exchange::Nse);
    assert_eq!(section.segment, Segment::Fo);

    let categories: Vec<&ChargeCategory> =
        section.lines.iter().map(|line| &line.category).collect();
    assert_eq!(
        categories,
        vec![
            &ChargeCategory::Brokerage,
            &ChargeCategory::ExchangeTransaction,
            &ChargeCategory::SebiFee,
            &ChargeCategory::Stt,
            &ChargeCategory::StampDuty,
            &ChargeCategory::Gst,
        ]
    );

    let amounts: Vec<Decimal> = section.lines.iter().map(|line| line.amount).collect();
    assert_eq!(
        amounts,
        vec![
            dec("40"),    // brokerage: 2 trades x 20
            dec("8.25"),  // 16500 x 0.05%
            dec("0.02"),  // 16500 x 0.0001%, rounded up from 0.0165
            dec("9"),     // sell 9000 x 0.1%, whole rupees
            dec("0.23"),  // buy 7500 x 0.003%, rounded up from 0.225
            dec("8.69"),  // 18% of 48.27
        ]
    );
    assert_eq!(section.subtotal, dec("66.19"));

    assert_eq!(bill.charges_total, dec("66.19"));
    assert_eq!(bill.net_amount, dec("1500"));
    assert_eq!(bill.total_payable, dec("1433.81"));
}

#[test]
fn gst_basis_is_the_rounded_sum_of_applicable_lines() {
    let bill = fixture_bill();
    let gst = bill.sections[0]
        .lines
        .iter()
        .find(|line| line.category == ChargeCategory::Gst)
        .expect("gst line");
    // brokerage 40 + transaction 8.25 + sebi 0.02; STT and stamp excluded.
    assert_eq!(gst.basis, dec("48.27"));
    assert!(!gst.gst_applicable);
}

#[test]
fn subtotal_equals_exact_sum_of_line_amounts() {
    let bill = fixture_bill();
    for section in bill.sections.iter().chain(bill.daywise_sections.iter()) {
        let sum: Decimal = section.lines.iter().map(|line| line.amount).sum();
        assert_eq!(section.subtotal, sum);
    }
    let total: Decimal = bill.sections.iter().map(|s| s.subtotal).sum();
    assert_eq!(bill.charges_total, total.round_dp(2));
}

#[test]
fn matching_sources_produce_no_warnings() {
    let bill = fixture_bill();
    assert!(bill.warnings.is_empty());
    assert_eq!(bill.sections, bill.daywise_sections);
}

#[test]
fn positions_aggregate_the_daywise_records() {
    let bill = fixture_bill();
    assert_eq!(bill.positions.len(), 1);
    let row = &bill.positions[0];
    assert_eq!(row.symbol, "NIFTY 25APR25 23500 CE");
    assert_eq!(row.buy_qty, dec("75"));
    assert_eq!(row.sell_value, dec("9000"));
    assert_eq!(row.net_qty, dec("0"));
    assert_eq!(row.net_value, dec("1500"));
    assert_eq!(bill.position_totals.net_value, dec("1500"));
}

#[test]
fn identical_inputs_serialize_identically() {
    let a = serde_json::to_string(&fixture_bill()).expect("serialize");
    let b = serde_json::to_string(&fixture_bill()).expect("serialize");
    assert_eq!(a, b);
}

#[test]
fn json_roundtrip_preserves_every_section_and_line() {
    let bill = fixture_bill();
    let json = serde_json::to_string(&bill).expect("serialize");
    let back: Bill = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back, bill);

    let value: serde_json::Value = serde_json::from_str(&json).expect("parse json");
    let line = &value["sections"][0]["lines"][0];
    assert!(line.get("basis").is_some());
    assert!(line.get("rate").is_some());
    assert!(line.get("amount").is_some());
}

#[test]
fn section_order_is_stable_under_row_shuffling() {
    let header = "TradeDate,ExchgSeg,Symbol,Side,Qty,Price";
    let nse = "01-04-2025,NSE_FNO,NIFTY 25APR25 23500 CE,B,75,100";
    let bse = "01-04-2025,BFO,SENSEX 25APR25 80000 CE,S,10,250";
    let forward = format!("{header}\n{nse}\n{bse}\n");
    let reversed = format!("{header}\n{bse}\n{nse}\n");
    let card = fixture_card();

    let bill_of = |text: &str| {
        let day = RawExport::from_text(text, FileRole::Daywise).expect("decode");
        let net = RawExport::from_text(text, FileRole::Netwise).expect("decode");
        Bill::generate("PR001", trade_date(), &day, &net, &card).expect("generate")
    };

    let a = bill_of(&forward);
    let b = bill_of(&reversed);
    assert_eq!(a, b);
    assert_eq!(a.sections.len(), 2);
    assert_eq!(a.sections[0].exchange, Exchange::Nse);
    assert_eq!(a.sections[1].exchange, Exchange::Bse);
}

#[test]
fn missing_required_category_fails_the_whole_request() {
    // Same card as the fixture minus the stamp duty entries.
    let text = std::fs::read_to_string(fixture_path("rate_card.toml")).expect("read card");
    let stripped: String = text
        .split("[[entry]]")
        .filter(|block| !block.contains("stamp_duty"))
        .collect::<Vec<_>>()
        .join("[[entry]]");
    let card = RateCard::from_toml_str(&stripped, "inline").expect("load stripped card");

    let day = fixture_raw("daywise.csv", FileRole::Daywise);
    let net = fixture_raw("netwise.csv", FileRole::Netwise);
    let err = Bill::generate("PR001", trade_date(), &day, &net, &card).unwrap_err();
    assert!(matches!(
        err,
        BillError::RateNotFound {
            category: ChargeCategory::StampDuty,
            ..
        }
    ));
}

#[test]
fn slab_charge_is_progressive_not_top_rate() {
    let card = RateCard::from_toml_str(
        r#"
        [[entry]]
        exchange = "NSE"
        segment = "FO"
        category = "brokerage"
        label = "Brokerage"
        gst = true
        rate = { kind = "slab", slab = [
            { upto = "10000", percent = "0.1" },
            { percent = "0.05" },
        ] }

        [[entry]]
        exchange = "NSE"
        segment = "FO"
        category = "exchange_transaction"
        label = "NSE Transaction Charges"
        gst = true
        rate = { kind = "percent", all = "0.05" }

        [[entry]]
        exchange = "NSE"
        segment = "FO"
        category = "sebi_fee"
        label = "SEBI Fees"
        gst = true
        rate = { kind = "percent", all = "0.0001" }

        [[entry]]
        exchange = "NSE"
        segment = "FO"
        category = "stt"
        label = "STT (Sell)"
        side = "sell"
        round = 0
        rate = { kind = "percent", all = "0.1" }

        [[entry]]
        exchange = "NSE"
        segment = "FO"
        category = "stamp_duty"
        label = "Stamp Duty"
        side = "buy"
        rate = { kind = "percent", all = "0.003" }

        [[entry]]
        exchange = "NSE"
        segment = "FO"
        category = "gst"
        label = "GST (18%)"
        rate = { kind = "percent", all = "18" }
        "#,
        "inline",
    )
    .expect("load slab card");

    let day = fixture_raw("daywise.csv", FileRole::Daywise);
    let net = fixture_raw("netwise.csv", FileRole::Netwise);
    let bill = Bill::generate("PR001", trade_date(), &day, &net, &card).expect("generate");

    let brokerage = bill.sections[0]
        .lines
        .iter()
        .find(|line| line.category == ChargeCategory::Brokerage)
        .expect("brokerage line");
    // Turnover 16500 straddles the 10000 boundary:
    // 10000 x 0.1% + 6500 x 0.05% = 10 + 3.25.
    assert_eq!(brokerage.amount, dec("13.25"));
    assert_ne!(brokerage.amount, dec("8.25")); // top-slab rate on the whole
}

#[test]
fn rate_card_extras_are_billed_and_feed_gst() {
    // The shipped card carries clearing and IPFT entries beyond the six
    // core categories.
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("config")
        .join("rate_card.toml");
    let card = RateCard::load(path).expect("load shipped card");

    let day = fixture_raw("daywise.csv", FileRole::Daywise);
    let net = fixture_raw("netwise.csv", FileRole::Netwise);
    let bill = Bill::generate("PR001", trade_date(), &day, &net, &card).expect("generate");

    let section = &bill.sections[0];
    let categories: Vec<&ChargeCategory> =
        section.lines.iter().map(|line| &line.category).collect();
    assert_eq!(
        categories,
        vec![
            &ChargeCategory::Brokerage,
            &ChargeCategory::ExchangeTransaction,
            &ChargeCategory::SebiFee,
            &ChargeCategory::Stt,
            &ChargeCategory::StampDuty,
            &ChargeCategory::Other("clearing".to_string()),
            &ChargeCategory::Other("ipft".to_string()),
            &ChargeCategory::Gst,
        ]
    );

    let line = |cat: &ChargeCategory| {
        section
            .lines
            .iter()
            .find(|line| line.category == *cat)
            .unwrap_or_else(|| panic!("no '{cat}' line"))
    };
    let clearing = line(&ChargeCategory::Other("clearing".to_string()));
    assert_eq!(clearing.amount, dec("0.04")); // 16500 x 0.00025%
    assert!(clearing.gst_applicable);
    let ipft = line(&ChargeCategory::Other("ipft".to_string()));
    assert_eq!(ipft.amount, dec("0.08")); // option turnover 16500 x 0.0005%
    assert!(ipft.gst_applicable);

    // The extras land in the GST base alongside brokerage, transaction
    // charges (options at 0.0505% = 8.33) and SEBI fees.
    let gst = line(&ChargeCategory::Gst);
    assert_eq!(gst.basis, dec("48.47")); // 40 + 8.33 + 0.02 + 0.04 + 0.08
    assert_eq!(gst.amount, dec("8.72"));
    let applicable: Decimal = section
        .lines
        .iter()
        .filter(|line| line.gst_applicable)
        .map(|line| line.amount)
        .sum();
    assert_eq!(gst.basis, applicable);
}

#[test]
fn gst_base_is_the_exact_sum_of_rounded_lines() {
    // SEBI fees round to 4 decimals here; the GST base must carry that
    // precision instead of being re-rounded to the minor unit.
    let card = RateCard::from_toml_str(
        r#"
        [[entry]]
        exchange = "NSE"
        segment = "FO"
        category = "brokerage"
        label = "Brokerage"
        gst = true
        rate = { kind = "flat", per_trade = "20" }

        [[entry]]
        exchange = "NSE"
        segment = "FO"
        category = "exchange_transaction"
        label = "NSE Transaction Charges"
        gst = true
        rate = { kind = "percent", all = "0.05" }

        [[entry]]
        exchange = "NSE"
        segment = "FO"
        category = "sebi_fee"
        label = "SEBI Fees"
        gst = true
        round = 4
        rate = { kind = "percent", all = "0.0001" }

        [[entry]]
        exchange = "NSE"
        segment = "FO"
        category = "stt"
        label = "STT (Sell)"
        side = "sell"
        round = 0
        rate = { kind = "percent", all = "0.1" }

        [[entry]]
        exchange = "NSE"
        segment = "FO"
        category = "stamp_duty"
        label = "Stamp Duty"
        side = "buy"
        rate = { kind = "percent", all = "0.003" }

        [[entry]]
        exchange = "NSE"
        segment = "FO"
        category = "gst"
        label = "GST (18%)"
        rate = { kind = "percent", all = "18" }
        "#,
        "inline",
    )
    .expect("load card");

    let day = fixture_raw("daywise.csv", FileRole::Daywise);
    let net = fixture_raw("netwise.csv", FileRole::Netwise);
    let bill = Bill::generate("PR001", trade_date(), &day, &net, &card).expect("generate");

    let gst = bill.sections[0]
        .lines
        .iter()
        .find(|line| line.category == ChargeCategory::Gst)
        .expect("gst line");
    // 40 + 8.25 + 0.0165, not 48.27.
    assert_eq!(gst.basis, dec("48.2665"));
    assert_eq!(gst.amount, dec("8.69"));

    // Edits re-derive the base with the same precision.
    let edited = bill
        .apply_edits(
            &card,
            &[LineOverride {
                exchange: Exchange::Nse,
                segment: Segment::Fo,
                category: ChargeCategory::Brokerage,
                amount: dec("100"),
            }],
            &[],
        )
        .expect("apply override");
    let gst = edited.sections[0]
        .lines
        .iter()
        .find(|line| line.category == ChargeCategory::Gst)
        .expect("gst line");
    assert_eq!(gst.basis, dec("108.2665"));
    assert_eq!(gst.amount, dec("19.49"));
}

#[test]
fn gst_rate_comes_from_the_all_field() {
    // A GST entry that also carries an instrument-specific rate must
    // still be applied at its `all` rate.
    let text = std::fs::read_to_string(fixture_path("rate_card.toml")).expect("read card");
    let patched = text.replace(
        r#"rate = { kind = "percent", all = "18" }"#,
        r#"rate = { kind = "percent", future = "28", all = "18" }"#,
    );
    let card = RateCard::from_toml_str(&patched, "inline").expect("load patched card");

    let day = fixture_raw("daywise.csv", FileRole::Daywise);
    let net = fixture_raw("netwise.csv", FileRole::Netwise);
    let bill = Bill::generate("PR001", trade_date(), &day, &net, &card).expect("generate");

    let gst = bill.sections[0]
        .lines
        .iter()
        .find(|line| line.category == ChargeCategory::Gst)
        .expect("gst line");
    assert_eq!(gst.amount, dec("8.69")); // 18% of 48.27
    assert_ne!(gst.amount, dec("13.52")); // 28% of 48.27
}

#[test]
fn diverging_sources_warn_and_netwise_wins() {
    let day = fixture_raw("daywise.csv", FileRole::Daywise);
    let net = RawExport::from_text(
        "TradeDate,ExchgSeg,TradingSymbol,Side,Qty,Price\n\
         01-04-2025,NSE_FNO,NIFTY 25APR25 23500 CE,B,75,100\n\
         01-04-2025,NSE_FNO,NIFTY 25APR25 23500 CE,S,75,200\n",
        FileRole::Netwise,
    )
    .expect("decode");
    let bill = Bill::generate("PR001", trade_date(), &day, &net, &fixture_card())
        .expect("generate");

    assert_eq!(bill.warnings.len(), 1);
    let warning = &bill.warnings[0];
    assert_eq!(warning.exchange, Exchange::Nse);
    assert_eq!(warning.segment, Segment::Fo);
    assert_eq!(warning.difference, dec("9.54"));
    assert_eq!(warning.tolerance, dec("0.06")); // one minor unit per line

    // Netwise figures carry the bill; Daywise stays as audit detail.
    assert_eq!(bill.charges_total, dec("75.73"));
    assert_eq!(bill.daywise_sections[0].subtotal, dec("66.19"));
}

#[test]
fn override_recomputes_gst_and_totals() {
    let bill = fixture_bill();
    let card = fixture_card();
    let edited = bill
        .apply_edits(
            &card,
            &[LineOverride {
                exchange: Exchange::Nse,
                segment: Segment::Fo,
                category: ChargeCategory::Brokerage,
                amount: dec("100"),
            }],
            &[],
        )
        .expect("apply override");

    let section = &edited.sections[0];
    let gst = section
        .lines
        .iter()
        .find(|line| line.category == ChargeCategory::Gst)
        .expect("gst line");
    assert_eq!(gst.basis, dec("108.27"));
    assert_eq!(gst.amount, dec("19.49"));
    assert_eq!(section.subtotal, dec("136.99"));
    assert_eq!(edited.charges_total, dec("136.99"));
    assert_eq!(edited.total_payable, dec("1363.01"));

    // The input bill is untouched.
    assert_eq!(bill.sections[0].subtotal, dec("66.19"));
}

#[test]
fn overridden_gst_is_not_recomputed() {
    let edited = fixture_bill()
        .apply_edits(
            &fixture_card(),
            &[LineOverride {
                exchange: Exchange::Nse,
                segment: Segment::Fo,
                category: ChargeCategory::Gst,
                amount: dec("5"),
            }],
            &[],
        )
        .expect("apply override");
    let gst = edited.sections[0]
        .lines
        .iter()
        .find(|line| line.category == ChargeCategory::Gst)
        .expect("gst line");
    assert_eq!(gst.amount, dec("5"));
    assert_eq!(edited.sections[0].subtotal, dec("62.50"));
}

#[test]
fn addition_appends_a_custom_line() {
    let edited = fixture_bill()
        .apply_edits(
            &fixture_card(),
            &[],
            &[LineAddition {
                exchange: Exchange::Nse,
                segment: Segment::Fo,
                label: "  DP   Charges ".to_string(),
                amount: dec("15.50"),
                gst_applicable: false,
            }],
        )
        .expect("apply addition");

    let section = &edited.sections[0];
    let added = section
        .lines
        .iter()
        .find(|line| line.label == "DP Charges")
        .expect("added line");
    assert_eq!(added.amount, dec("15.50"));
    // Custom lines sort before GST.
    assert_eq!(
        section.lines.last().map(|line| &line.category),
        Some(&ChargeCategory::Gst)
    );
    assert_eq!(section.subtotal, dec("81.69"));
}

#[test]
fn addition_matching_an_existing_charge_is_rejected() {
    let err = fixture_bill()
        .apply_edits(
            &fixture_card(),
            &[],
            &[LineAddition {
                exchange: Exchange::Nse,
                segment: Segment::Fo,
                label: "Brokerage".to_string(),
                amount: dec("1"),
                gst_applicable: false,
            }],
        )
        .unwrap_err();
    assert!(matches!(err, BillError::Edit(_)));
}

#[test]
fn batch_splits_accounts_in_natural_order() {
    let day = fixture_raw("admin_daywise.csv", FileRole::Daywise);
    let net = fixture_raw("admin_netwise.csv", FileRole::Netwise);
    let batch = BillBatch::from_exports(trade_date(), &day, &net, &fixture_card())
        .expect("generate batch");

    assert!(batch.failures.is_empty());
    assert_eq!(batch.bills.len(), 2);
    assert_eq!(batch.bills[0].account, AccountId("PR7".to_string()));
    assert_eq!(batch.bills[1].account, AccountId("PR0012".to_string()));

    assert_eq!(batch.bills[0].charges_total, dec("3441.66"));
    assert_eq!(batch.bills[1].charges_total, dec("66.19"));
    assert!(batch.by_account(&AccountId("PR7".to_string())).is_some());
    assert!(batch.by_account(&AccountId("PR99".to_string())).is_none());
}

#[test]
fn batch_collects_rows_without_an_account_cell() {
    let text = "TradeDate,ExchgSeg,Symbol,Side,Qty,Price,Account\n\
                01-04-2025,NSE_FNO,NIFTY 25APR25 23500 CE,B,75,100,PR7\n\
                01-04-2025,NSE_FNO,NIFTY 25APR25 23500 CE,S,75,120,\n";
    let day = RawExport::from_text(text, FileRole::Daywise).expect("decode");
    let net = RawExport::from_text(text, FileRole::Netwise).expect("decode");
    let batch = BillBatch::from_exports(trade_date(), &day, &net, &fixture_card())
        .expect("generate batch");

    assert_eq!(batch.bills.len(), 1);
    assert_eq!(batch.failures.len(), 2); // one per export
    assert!(batch.failures[0].account.is_none());
    assert!(batch.failures[0].reason.contains('2'));
}

#[test]
fn batch_requires_account_identifiers() {
    let day = fixture_raw("daywise.csv", FileRole::Daywise);
    let net = fixture_raw("netwise.csv", FileRole::Netwise);
    let err = BillBatch::from_exports(trade_date(), &day, &net, &fixture_card()).unwrap_err();
    assert!(matches!(err, BillError::Batch(_)));
}
