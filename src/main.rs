use rs_layer2::logging::{init_logging, LogConfig};
use rs_layer2::{
    dump_arp_table, dump_mac_table, send_arp_broadcast_request, Graph, InterfaceMode, Result,
    Wire, IP,
};

/// Three hosts on one access switch. H1 resolves H2 through the switch,
/// then the learned tables are printed.
fn main() -> Result<()> {
    init_logging(&LogConfig::default());

    let mut graph = Graph::new("l2_switch_demo")?;
    let sw = graph.add_node("L2SW")?;
    let h1 = graph.add_node("H1")?;
    let h2 = graph.add_node("H2")?;
    let h3 = graph.add_node("H3")?;

    graph.insert_link(h1, sw, "eth0/0", "eth0/1", 1)?;
    graph.insert_link(h2, sw, "eth0/0", "eth0/2", 1)?;
    graph.insert_link(h3, sw, "eth0/0", "eth0/3", 1)?;

    for (host, ip) in [(h1, [10, 0, 0, 1]), (h2, [10, 0, 0, 2]), (h3, [10, 0, 0, 3])] {
        if let Some(node) = graph.get_node_mut(host) {
            node.set_intf_ip_address("eth0/0", IP(ip), 24)?;
        }
    }
    if let Some(node) = graph.get_node_mut(sw) {
        node.set_interfaces_mode(InterfaceMode::ACCESS);
    }

    let mut wire = Wire::new(&graph);
    if let Some(node) = graph.get_node(h1) {
        send_arp_broadcast_request(node, None, IP([10, 0, 0, 2]), &mut wire)?;
    }
    let delivered = wire.run(&graph);
    println!("{} frames delivered\n", delivered);

    for node in graph.nodes() {
        println!("{}:", node.get_name());
        print!("{}", dump_arp_table(node));
        print!("{}", dump_mac_table(node));
        println!();
    }
    Ok(())
}
