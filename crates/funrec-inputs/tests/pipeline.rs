//! End-to-end input assembly: descriptors to a `[batch, F]` model input.

use std::sync::Arc;

use funrec_inputs::prelude::*;
use funrec_inputs::GroupedEmbeddings;
use funrec_tensor::Tensor;

fn din_columns() -> Vec<FeatureColumn> {
    let item = |name: &str| {
        SparseFeat::builder(name, 50)
            .embedding_dim(8)
            .embedding_name("item_id")
            .group_name("item")
            .build()
            .unwrap()
    };
    vec![
        SparseFeat::builder("user_id", 20)
            .embedding_dim(8)
            .group_name("user")
            .build()
            .unwrap()
            .into(),
        item("item_id").into(),
        VarLenSparseFeat::builder(item("hist_item_id"), 4)
            .combiner(Combiner::Mean)
            .length_name("seq_len")
            .build()
            .unwrap()
            .into(),
        VarLenSparseFeat::builder(item("neg_item_id"), 4)
            .combiner(Combiner::Sum)
            .length_name("seq_len")
            .build()
            .unwrap()
            .into(),
        DenseFeat::new("price", 1).unwrap().into(),
    ]
}

fn batch(total_width: usize) -> Tensor {
    #[rustfmt::skip]
    let rows = [
        // user, item, hist x4, seq_len, neg x4, price
        3.0, 7.0, 1.0, 2.0, 3.0, 0.0, 3.0, 4.0, 5.0, 6.0, 0.0, 0.5,
        4.0, 9.0, 8.0, 0.0, 0.0, 0.0, 1.0, 2.0, 0.0, 0.0, 0.0, 1.5,
    ];
    Tensor::from_slice(&rows, &[2, total_width])
}

#[test]
fn test_layout_shares_length_column() {
    let layout = build_layout(&din_columns()).unwrap();
    assert_eq!(
        get_feature_names(&din_columns()).unwrap(),
        vec!["user_id", "item_id", "hist_item_id", "seq_len", "neg_item_id", "price"]
    );
    assert_eq!(layout.total_width(), 12);
}

#[test]
fn test_shared_item_table() {
    let columns = din_columns();
    let tables = build_tables(&columns, &TableOptions::builder().seed(5).build().unwrap()).unwrap();
    assert_eq!(tables.len(), 2);

    let item = tables.for_feature(columns[1].as_embedded().unwrap()).unwrap();
    let hist = tables.for_feature(columns[2].as_embedded().unwrap()).unwrap();
    assert!(Arc::ptr_eq(item, hist));
}

#[test]
fn test_end_to_end_shapes() {
    let columns = din_columns();
    let layout = shared_layout(&columns).unwrap();
    let tables = build_tables(&columns, &TableOptions::builder().seed(5).build().unwrap()).unwrap();
    let x = batch(layout.total_width());

    let (sparse, dense) = input_from_feature_columns(&x, &layout, &columns, &tables).unwrap();
    assert_eq!(sparse.len(), 4);
    assert!(sparse.iter().all(|t| t.shape() == &[2, 1, 8]));
    assert_eq!(dense.len(), 1);
    assert_eq!(dense[0].to_vec(), vec![0.5, 1.5]);

    let input = combined_dnn_input(&sparse, &dense).unwrap();
    assert_eq!(input.shape(), &[2, 4 * 8 + 1]);
}

#[test]
fn test_pooling_uses_length_column() {
    let columns = din_columns();
    let layout = build_layout(&columns).unwrap();
    let tables = build_tables(&columns, &TableOptions::builder().seed(9).build().unwrap()).unwrap();
    let x = batch(layout.total_width());

    // Overwrite the item table so row i is all i.
    let table = tables.get("item_id").unwrap();
    {
        let mut weight = table.weight_mut();
        for (row, mut values) in weight.as_ndarray_mut().outer_iter_mut().enumerate() {
            values.fill(row as f32);
        }
    }

    let varlen = varlen_columns(&columns);
    let sequences = varlen_embedding_lookup(&x, &tables, &layout, &varlen).unwrap();
    assert_eq!(sequences["hist_item_id"].shape(), &[2, 4, 8]);

    let pooled = varlen_pooling_list(&sequences, &x, &layout, &varlen).unwrap();
    // hist (mean): (1 + 2 + 3) / 3 and 8 / 1.
    assert_eq!(pooled[0].to_vec()[0], 2.0);
    assert_eq!(pooled[0].to_vec()[8], 8.0);
    // neg (sum): 4 + 5 + 6 and 2, both cut at seq_len.
    assert_eq!(pooled[1].to_vec()[0], 15.0);
    assert_eq!(pooled[1].to_vec()[8], 2.0);
}

#[test]
fn test_grouped_lookup_keeps_groups_apart() {
    let columns = din_columns();
    let layout = build_layout(&columns).unwrap();
    let tables = build_tables(&columns, &TableOptions::builder().seed(1).build().unwrap()).unwrap();
    let x = batch(layout.total_width());

    let sparse = sparse_columns(&columns);
    let grouped: GroupedEmbeddings =
        embedding_lookup(&x, &tables, &layout, &sparse, &LookupOptions::new()).unwrap();
    let groups: Vec<&str> = grouped.groups().map(|g| g.as_str()).collect();
    assert_eq!(groups, vec!["user", "item"]);
    assert_eq!(grouped.get("user").unwrap().len(), 1);
    assert_eq!(grouped.get("item").unwrap().len(), 1);

    let only_items = embedding_lookup(
        &x,
        &tables,
        &layout,
        &sparse,
        &LookupOptions::new().return_features(["item_id"]),
    )
    .unwrap();
    assert_eq!(only_items.len(), 1);
}

#[test]
fn test_out_of_vocabulary_id_fails() {
    let columns = din_columns();
    let layout = build_layout(&columns).unwrap();
    let tables = build_tables(&columns, &TableOptions::default()).unwrap();
    let mut data = batch(layout.total_width()).to_vec();
    data[0] = 20.0;
    let x = Tensor::from_slice(&data, &[2, layout.total_width()]);

    let err = input_from_feature_columns(&x, &layout, &columns, &tables).unwrap_err();
    assert!(matches!(err, InputError::IndexOutOfRange { index: 20, .. }));
}
